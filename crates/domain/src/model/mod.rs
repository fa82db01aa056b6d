//! Value types passed to and returned from the driver.

pub mod collection;
pub mod consistency;
pub mod payload;
pub mod result;
pub mod statement;
pub mod value;

pub use collection::{Collection, CollectionIter, CollectionKind};
pub use consistency::Consistency;
pub use payload::CustomPayload;
pub use result::{ColumnSpec, ResultSet, Response, Row};
pub use statement::{derive_prepared_id, PreparedId, PreparedStatement, Statement};
pub use value::{CqlType, Value};
