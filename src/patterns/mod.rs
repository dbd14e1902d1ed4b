pub mod crud;
pub mod in_memory;
pub mod repository;
pub mod table;

pub use crud::CrudRepository;
pub use in_memory::InMemoryRepository;
pub use repository::{Entity, Repository};
pub use table::{Column, ColumnKind, Table};
