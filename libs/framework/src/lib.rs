//! # charm-framework
//!
//! Observer/dispatch framework for charm operators.
//!
//! A single process invocation handles one platform event end to end:
//!
//! 1. [`Dispatcher`] derives the event name and arguments from the environment
//! 2. [`Framework::reemit`] re-delivers events deferred by earlier invocations
//! 3. [`Framework::emit`] delivers the new event to its observers in order
//! 4. [`Framework::commit`] persists deferred events and the event counter
//!
//! Charm code reaches the platform only through the [`PlatformGateway`]
//! capability, wrapped by the [`Model`] facade.

pub mod dispatch;
pub mod env;
pub mod framework;
pub mod metadata;
pub mod model;
pub mod registry;
pub mod store;
pub mod testing;

pub use dispatch::Dispatcher;
pub use env::{EnvError, RuntimeEnv};
pub use framework::{EventContext, Framework, FrameworkError, Observer, CHARM_STATE_FILE};
pub use metadata::{CharmMeta, MetadataError};
pub use model::{Model, ModelError, PlatformGateway, Status};
pub use registry::{RegistryError, SourceRegistry};
pub use store::{EventStore, StoreError};
