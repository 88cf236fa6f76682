/*!
# VibeStats DevKit

Outils de test pour le kernel VibeStats :
- Fixtures de registre (`RegistryBuilder`, `EntityBuilder`)
- Sources scriptées (registre et télémétrie)
- Harness qui branche le tout sur coordinateurs et EntryManager
*/

pub mod fixtures;
pub mod sources;
pub mod test_utils;

pub use fixtures::{EntityBuilder, RegistryBuilder};
pub use sources::{ScriptStep, ScriptedRegistry, StaticTelemetry};
pub use test_utils::{init_tracing, TestHarness};
