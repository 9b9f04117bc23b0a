use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::{path::Path as ObjPath, ClientOptions, ObjectMeta, ObjectStore};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{error::AppError, utils::config::AppConfig};

pub type DynStore = Arc<dyn ObjectStore>;

/// One entry of a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
}

impl From<ObjectMeta> for ListedObject {
    fn from(meta: ObjectMeta) -> Self {
        Self {
            key: meta.location.to_string(),
            size: u64::try_from(meta.size).unwrap_or(u64::MAX),
        }
    }
}

/// A single page of a listing. `next_token` is `None` on the last page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: Vec<ListedObject>,
    pub next_token: Option<String>,
}

/// What a storage probe found under a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub objects: usize,
    pub bytes: u64,
    pub skipped_markers: usize,
    pub sample_key: Option<String>,
    pub sample_bytes: Option<u64>,
}

/// Read access to the bucket documents are synced from.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    page_size: usize,
}

impl StorageManager {
    /// Create a StorageManager for the S3-compatible endpoint in the configuration.
    ///
    /// Requests are path-style, plain HTTP is allowed and TLS certificates are
    /// not validated, so self-signed MinIO deployments work out of the box.
    pub fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let store = create_storage_backend(cfg)?;
        Ok(Self::with_backend(store, cfg.s3_page_size))
    }

    /// Create a StorageManager with a custom storage backend.
    ///
    /// Tests use this to run against `object_store::memory::InMemory`.
    pub fn with_backend(store: DynStore, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Fetch one page of keys starting with `prefix`, resuming after `after`.
    ///
    /// `prefix` has raw S3 semantics: `data/rep` matches `data/report.md`. The
    /// continuation token is the last key seen on the previous page, before
    /// prefix filtering, so filtering never stalls the listing.
    pub async fn list_page(
        &self,
        prefix: &str,
        after: Option<&str>,
    ) -> Result<ObjectPage, AppError> {
        let root = listing_root(prefix);
        let root = (!root.is_empty()).then(|| ObjPath::from(root));

        let stream = match after {
            Some(token) => {
                let offset = ObjPath::parse(token).map_err(object_store::Error::from)?;
                self.store.list_with_offset(root.as_ref(), &offset)
            }
            None => self.store.list(root.as_ref()),
        };

        let metas: Vec<ObjectMeta> = stream.take(self.page_size).try_collect().await?;

        let next_token = if metas.len() == self.page_size {
            metas.last().map(|meta| meta.location.to_string())
        } else {
            None
        };

        let mut objects: Vec<ListedObject> = metas
            .into_iter()
            .map(ListedObject::from)
            .filter(|object| object.key.starts_with(prefix))
            .collect();
        self.restore_marker_slashes(&mut objects).await?;

        debug!(
            prefix = %prefix,
            objects = objects.len(),
            has_more = next_token.is_some(),
            "listed object page"
        );

        Ok(ObjectPage {
            objects,
            next_token,
        })
    }

    /// Give folder markers back the trailing `/` that `object_store` strips.
    ///
    /// A zero-byte entry is a marker when a delimited listing of its parent
    /// folder reports it as a common prefix rather than as an object. Each
    /// parent is listed at most once per page.
    async fn restore_marker_slashes(&self, objects: &mut [ListedObject]) -> Result<(), AppError> {
        let mut folders: HashMap<String, HashSet<String>> = HashMap::new();

        for object in objects
            .iter_mut()
            .filter(|object| object.size == 0 && !is_directory_marker(&object.key))
        {
            let parent = object
                .key
                .rsplit_once('/')
                .map_or("", |(parent, _)| parent)
                .to_string();

            if !folders.contains_key(&parent) {
                let root = (!parent.is_empty()).then(|| ObjPath::from(parent.as_str()));
                let listing = self.store.list_with_delimiter(root.as_ref()).await?;
                let prefixes = listing
                    .common_prefixes
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                folders.insert(parent.clone(), prefixes);
            }

            if folders
                .get(&parent)
                .is_some_and(|prefixes| prefixes.contains(&object.key))
            {
                debug!(key = %object.key, "zero-byte folder marker");
                object.key.push('/');
            }
        }

        Ok(())
    }

    /// List every key under `prefix`, following continuation tokens to the end.
    pub async fn list(&self, prefix: &str) -> Result<Vec<ListedObject>, AppError> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self.list_page(prefix, token.as_deref()).await?;
            objects.extend(page.objects);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(objects)
    }

    /// Retrieve bytes from the specified location.
    ///
    /// Returns the full contents buffered in memory.
    pub async fn get(&self, key: &str) -> Result<Bytes, AppError> {
        let path = ObjPath::parse(key).map_err(object_store::Error::from)?;
        let result = self.store.get(&path).await?;
        Ok(result.bytes().await?)
    }

    /// Stream the object at `key` into `destination`, returning bytes written.
    ///
    /// The parent directory must already exist. An existing file is truncated.
    pub async fn download_to(&self, key: &str, destination: &Path) -> Result<u64, AppError> {
        let path = ObjPath::parse(key).map_err(object_store::Error::from)?;
        let mut stream = self.store.get(&path).await?.into_stream();

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written = written.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
        }
        file.flush().await?;

        Ok(written)
    }

    /// Check that the prefix can be listed and that an object can be read back.
    pub async fn probe(&self, prefix: &str) -> Result<ProbeReport, AppError> {
        let listed = self.list(prefix).await?;
        let (objects, markers) = partition_directory_markers(listed);

        let bytes = objects
            .iter()
            .fold(0_u64, |acc, object| acc.saturating_add(object.size));

        let mut report = ProbeReport {
            objects: objects.len(),
            bytes,
            skipped_markers: markers.len(),
            sample_key: None,
            sample_bytes: None,
        };

        if let Some(first) = objects.first() {
            let data = self.get(&first.key).await?;
            report.sample_key = Some(first.key.clone());
            report.sample_bytes = Some(u64::try_from(data.len()).unwrap_or(u64::MAX));
        }

        Ok(report)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl StorageManager {
    /// In-memory storage seeded with `entries`, for tests.
    ///
    /// Keys ending in `/` are stored as zero-byte folder markers that delimited
    /// listings report as common prefixes, as S3 does.
    pub async fn memory(entries: &[(&str, &[u8])], page_size: usize) -> Result<Self, AppError> {
        let store = memory::MarkerAwareStore::seeded(entries).await?;
        Ok(Self::with_backend(Arc::new(store), page_size))
    }
}

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream::BoxStream;
    use object_store::{
        memory::InMemory, path::Path, GetOptions, GetResult, ListResult, MultipartUpload,
        ObjectMeta, ObjectStore, PutMultipartOpts, PutOptions, PutPayload, PutResult, Result,
    };

    /// `InMemory` plus S3's handling of folder markers in delimited listings.
    #[derive(Debug, Default)]
    pub struct MarkerAwareStore {
        inner: InMemory,
        markers: HashSet<Path>,
    }

    impl MarkerAwareStore {
        pub async fn seeded(entries: &[(&str, &[u8])]) -> Result<Self> {
            let mut store = Self::default();
            for (key, data) in entries {
                let location = Path::from(*key);
                if key.ends_with('/') {
                    store.markers.insert(location.clone());
                }
                store
                    .inner
                    .put(&location, PutPayload::from_bytes(Bytes::from(data.to_vec())))
                    .await?;
            }
            Ok(store)
        }
    }

    impl std::fmt::Display for MarkerAwareStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "MarkerAwareStore({})", self.inner)
        }
    }

    #[async_trait]
    impl ObjectStore for MarkerAwareStore {
        async fn put_opts(
            &self,
            location: &Path,
            payload: PutPayload,
            opts: PutOptions,
        ) -> Result<PutResult> {
            self.inner.put_opts(location, payload, opts).await
        }

        async fn put_multipart_opts(
            &self,
            location: &Path,
            opts: PutMultipartOpts,
        ) -> Result<Box<dyn MultipartUpload>> {
            self.inner.put_multipart_opts(location, opts).await
        }

        async fn get_opts(&self, location: &Path, options: GetOptions) -> Result<GetResult> {
            self.inner.get_opts(location, options).await
        }

        async fn delete(&self, location: &Path) -> Result<()> {
            self.inner.delete(location).await
        }

        fn list(&self, prefix: Option<&Path>) -> BoxStream<'_, Result<ObjectMeta>> {
            self.inner.list(prefix)
        }

        async fn list_with_delimiter(&self, prefix: Option<&Path>) -> Result<ListResult> {
            let mut listing = self.inner.list_with_delimiter(prefix).await?;
            let (markers, objects): (Vec<ObjectMeta>, Vec<ObjectMeta>) =
                std::mem::take(&mut listing.objects)
                    .into_iter()
                    .partition(|meta| self.markers.contains(&meta.location));
            listing.objects = objects;
            listing
                .common_prefixes
                .extend(markers.into_iter().map(|meta| meta.location));
            Ok(listing)
        }

        async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
            self.inner.copy(from, to).await
        }

        async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> Result<()> {
            self.inner.copy_if_not_exists(from, to).await
        }
    }
}

/// True for keys some S3 tools create to stand in for a folder.
pub fn is_directory_marker(key: &str) -> bool {
    key.ends_with('/')
}

/// Split a listing into `(objects, directory_markers)`.
///
/// Markers listed through [`StorageManager::list_page`] already carry their
/// trailing `/`. For other listings, a zero-byte object whose key is the parent
/// folder of another listed key counts as a marker too.
pub fn partition_directory_markers(
    objects: Vec<ListedObject>,
) -> (Vec<ListedObject>, Vec<ListedObject>) {
    let parents: HashSet<String> = objects
        .iter()
        .flat_map(|object| parent_prefixes(&object.key))
        .map(str::to_string)
        .collect();

    objects.into_iter().partition(|object| {
        !(is_directory_marker(&object.key)
            || (object.size == 0 && parents.contains(object.key.as_str())))
    })
}

fn parent_prefixes(key: &str) -> impl Iterator<Item = &str> {
    key.match_indices('/')
        .filter_map(move |(idx, _)| key.get(..idx))
        .filter(|parent| !parent.is_empty())
}

/// The folder to hand to `object_store` for a raw S3 prefix.
fn listing_root(prefix: &str) -> &str {
    if let Some(folder) = prefix.strip_suffix('/') {
        return folder;
    }
    prefix.rsplit_once('/').map_or("", |(folder, _)| folder)
}

/// Create the S3 backend described by the configuration.
fn create_storage_backend(cfg: &AppConfig) -> object_store::Result<DynStore> {
    let client_options = ClientOptions::new()
        .with_allow_http(true)
        .with_allow_invalid_certificates(true);

    let store = AmazonS3Builder::new()
        .with_endpoint(&cfg.s3_endpoint)
        .with_bucket_name(&cfg.s3_bucket)
        .with_access_key_id(&cfg.s3_access_key)
        .with_secret_access_key(&cfg.s3_secret_key)
        .with_region(&cfg.s3_region)
        .with_virtual_hosted_style_request(false)
        .with_client_options(client_options)
        .build()?;

    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::{memory::InMemory, PutPayload};
    use tempfile::tempdir;

    async fn seeded_store(entries: &[(&str, &[u8])]) -> DynStore {
        let store = InMemory::new();
        for (key, data) in entries {
            store
                .put(
                    &ObjPath::from(*key),
                    PutPayload::from_bytes(Bytes::from(data.to_vec())),
                )
                .await
                .expect("put");
        }
        Arc::new(store)
    }

    fn keys(objects: &[ListedObject]) -> Vec<&str> {
        objects.iter().map(|object| object.key.as_str()).collect()
    }

    #[test]
    fn listing_root_follows_raw_prefix() {
        assert_eq!(listing_root(""), "");
        assert_eq!(listing_root("kb/"), "kb");
        assert_eq!(listing_root("kb/sub/"), "kb/sub");
        assert_eq!(listing_root("kb/rep"), "kb");
        assert_eq!(listing_root("rep"), "");
    }

    #[tokio::test]
    async fn list_page_follows_continuation_tokens() {
        let store = seeded_store(&[
            ("kb/a.md", b"a"),
            ("kb/b.md", b"b"),
            ("kb/c.md", b"c"),
            ("kb/d.md", b"d"),
            ("kb/e.md", b"e"),
            ("other/x.md", b"x"),
        ])
        .await;
        let storage = StorageManager::with_backend(store, 2);

        let first = storage.list_page("kb/", None).await.expect("page 1");
        assert_eq!(keys(&first.objects), vec!["kb/a.md", "kb/b.md"]);
        assert_eq!(first.next_token.as_deref(), Some("kb/b.md"));

        let second = storage
            .list_page("kb/", first.next_token.as_deref())
            .await
            .expect("page 2");
        assert_eq!(keys(&second.objects), vec!["kb/c.md", "kb/d.md"]);

        let third = storage
            .list_page("kb/", second.next_token.as_deref())
            .await
            .expect("page 3");
        assert_eq!(keys(&third.objects), vec!["kb/e.md"]);
        assert!(third.next_token.is_none());

        let all = storage.list("kb/").await.expect("list all");
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn raw_prefix_matches_partial_segments() {
        let store = seeded_store(&[
            ("kb/alpha.md", b"a"),
            ("kb/report.md", b"r"),
            ("kb/research/notes.md", b"n"),
        ])
        .await;
        let storage = StorageManager::with_backend(store, 1000);

        let listed = storage.list("kb/re").await.expect("list");
        assert_eq!(keys(&listed), vec!["kb/report.md", "kb/research/notes.md"]);

        let everything = storage.list("").await.expect("list");
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn download_to_writes_object_contents() {
        let store = seeded_store(&[("kb/guide.md", b"# Guide\n")]).await;
        let storage = StorageManager::with_backend(store, 10);
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("guide.md");

        let written = storage
            .download_to("kb/guide.md", &target)
            .await
            .expect("download");

        assert_eq!(written, 8);
        let on_disk = tokio::fs::read(&target).await.expect("read back");
        assert_eq!(on_disk, b"# Guide\n");
    }

    #[tokio::test]
    async fn download_of_missing_object_fails() {
        let store = seeded_store(&[]).await;
        let storage = StorageManager::with_backend(store, 10);
        let dir = tempdir().expect("tempdir");

        let result = storage
            .download_to("kb/missing.md", &dir.path().join("missing.md"))
            .await;
        assert!(matches!(result, Err(AppError::ObjectStore(_))));
    }

    #[test]
    fn markers_are_separated_from_objects() {
        let listed = vec![
            ListedObject { key: "kb/".into(), size: 0 },
            ListedObject { key: "kb/sub".into(), size: 0 },
            ListedObject { key: "kb/sub/a.md".into(), size: 12 },
            ListedObject { key: "kb/empty.txt".into(), size: 0 },
        ];

        let (objects, markers) = partition_directory_markers(listed);
        assert_eq!(keys(&objects), vec!["kb/sub/a.md", "kb/empty.txt"]);
        assert_eq!(keys(&markers), vec!["kb/", "kb/sub"]);
    }

    #[tokio::test]
    async fn childless_folder_marker_is_listed_with_its_slash() {
        let storage = StorageManager::memory(
            &[
                ("kb/a.md", b"# A"),
                ("kb/drafts/", b""),
                ("kb/empty.md", b""),
                ("kb/guides/", b""),
                ("kb/guides/intro.md", b"intro"),
            ],
            2,
        )
        .await
        .expect("seed");

        let listed = storage.list("kb/").await.expect("list");
        assert_eq!(
            keys(&listed),
            vec![
                "kb/a.md",
                "kb/drafts/",
                "kb/empty.md",
                "kb/guides/",
                "kb/guides/intro.md"
            ]
        );

        let (objects, markers) = partition_directory_markers(listed);
        assert_eq!(
            keys(&objects),
            vec!["kb/a.md", "kb/empty.md", "kb/guides/intro.md"]
        );
        assert_eq!(keys(&markers), vec!["kb/drafts/", "kb/guides/"]);

        let report = storage.probe("kb/").await.expect("probe");
        assert_eq!(report.objects, 3);
        assert_eq!(report.skipped_markers, 2);
    }

    #[tokio::test]
    async fn probe_counts_objects_and_reads_a_sample() {
        let store = seeded_store(&[
            ("kb/docs", b""),
            ("kb/docs/a.md", b"hello"),
            ("kb/docs/b.md", b"world!"),
        ])
        .await;
        let storage = StorageManager::with_backend(store, 10);

        let report = storage.probe("kb/").await.expect("probe");
        assert_eq!(report.objects, 2);
        assert_eq!(report.bytes, 11);
        assert_eq!(report.skipped_markers, 1);
        assert_eq!(report.sample_key.as_deref(), Some("kb/docs/a.md"));
        assert_eq!(report.sample_bytes, Some(5));
    }

    #[tokio::test]
    async fn probe_of_empty_prefix_reports_nothing() {
        let store = seeded_store(&[("other/a.md", b"a")]).await;
        let storage = StorageManager::with_backend(store, 10);

        let report = storage.probe("kb/").await.expect("probe");
        assert_eq!(report, ProbeReport::default());
    }
}
