//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod device_activation_repo;
pub mod license_record_repo;

pub use device_activation_repo::DeviceActivationRepo;
pub use license_record_repo::LicenseRecordRepo;
