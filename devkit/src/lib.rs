/*!
# Headroom DevKit - Stubs et utilitaires de test

Bibliothèque facilitant les tests de l'agent et du kernel avec:
- Builder de snapshots conformes au contrat
- Collecteur HTTP factice (pas besoin de kernel)
- Helpers d'attente et de logging pour tests async
*/

pub mod collector_stub;
pub mod snapshot_builder;
pub mod test_utils;

pub use collector_stub::StubCollector;
pub use snapshot_builder::SnapshotBuilder;
pub use test_utils::{init_logging, wait_until};
