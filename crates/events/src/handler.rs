/// Execute an aggregate command in place: decide, then apply each decided event.
///
/// No persistence and no publication; the infra `CommandDispatcher` wraps the same
/// lifecycle with an event store. Mostly useful in domain tests.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: matflow_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
