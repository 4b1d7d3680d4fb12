pub mod allocation_directory;
pub mod mapping;
pub mod memory_repository;

pub use allocation_directory::InMemoryAllocationDirectory;
pub use mapping::{host_from_row, host_to_row, HostRow};
pub use memory_repository::InMemoryHostRepository;
