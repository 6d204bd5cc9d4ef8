use crate::id::DepotId;

/// A record with its own identity inside one depot.
///
/// Stock accounts and delivery notes are entities; material requests are
/// aggregates (see [`crate::AggregateRoot`]).
pub trait Entity {
    type Id: Copy + Eq + std::hash::Hash + std::fmt::Debug;

    fn entity_id(&self) -> Self::Id;

    fn owning_depot(&self) -> DepotId;

    fn belongs_to(&self, depot_id: DepotId) -> bool {
        self.owning_depot() == depot_id
    }
}
