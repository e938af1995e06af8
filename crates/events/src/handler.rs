/// Execute an aggregate command deterministically (no IO).
///
/// 1. **Decide**: `aggregate.handle(command)` returns events (no mutation)
/// 2. **Evolve**: each event is applied via `aggregate.apply(event)`
///
/// Used by tests and by the engine to preview a command against a rehydrated
/// aggregate. Persisted execution goes through the infra command dispatcher.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: procureflow_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
