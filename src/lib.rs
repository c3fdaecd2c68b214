pub mod error;
pub mod endian;
pub mod header;
pub mod codec;
pub mod block;
pub mod schema;
pub mod io_stream;
pub mod manifest;
pub mod explode;
pub mod implode;

pub use error::{Result, SplitError};
pub use header::{ContainerHeader, PointerWidth};
pub use block::{BlockCode, RecordHeader};
pub use schema::{SchemaBroker, StructCompare, TableBroker};
pub use io_stream::{Container, ContainerWriter};
pub use manifest::{Manifest, ManifestEntry, Payload};
pub use explode::{explode_file, ExplodeOptions, ExplodeReport};
pub use implode::{implode_file, ImplodeOptions, ImplodeReport};
