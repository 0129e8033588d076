//! Job processing stages for the mixbuster separation service.
//!
//! Each module is one stage of the per-job pipeline, usable on its own:
//!
//! - [`resolver`]: locate a model artifact and build its [`BackendConfiguration`].
//! - [`staging`]: job-scoped work areas and input acquisition.
//! - [`separator`]: the external processing capability.
//! - [`packaging`]: enumerate and archive produced stems.
//! - [`delivery`]: publish the archive and notify the job owner.
//! - [`inventory`]: list installed models per backend family.

pub mod delivery;
pub mod inventory;
pub mod packaging;
pub mod resolver;
pub mod retry;
pub mod separator;
pub mod staging;

pub use delivery::{DeliveryError, DeliveryReceipt, ResultDelivery};
pub use resolver::{BackendConfiguration, ParameterResolver, ResolutionError};
pub use separator::{ProgressSink, SeparationBackend, SeparationError, SubprocessSeparator};
pub use staging::{StagingError, StagingManager};
