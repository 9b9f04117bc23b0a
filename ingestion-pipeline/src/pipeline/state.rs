use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Ready,
    states: [Ready, Synced, Discovered, Ingested, Verified, Failed],
    events {
        synchronize { transition: { from: Ready, to: Synced } }
        discover { transition: { from: Synced, to: Discovered } }
        ingest { transition: { from: Discovered, to: Ingested } }
        verify { transition: { from: Ingested, to: Verified } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Synced, to: Failed }
            transition: { from: Discovered, to: Failed }
            transition: { from: Ingested, to: Failed }
            transition: { from: Verified, to: Failed }
        }
    }
}

pub fn ready() -> IngestionMachine<(), Ready> {
    IngestionMachine::new(())
}
