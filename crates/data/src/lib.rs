//! Lookup providers over the market (`CompRanges.csv`) and parity
//! (`EmployeeRoster.csv`) tables.
//!
//! Both implementations share [`Tables`], which owns the matching rules:
//! exact, trimmed, case-insensitive title and location equality.

pub mod csv_lookup;
pub mod in_memory;
pub mod tables;

pub use csv_lookup::CsvLookup;
pub use in_memory::InMemoryLookup;
pub use tables::{Tables, parse_amount};
