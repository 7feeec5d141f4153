#![doc = include_str!("../README.md")]

pub mod error;
pub mod message;
pub mod model;
pub mod record;
pub mod session;
pub mod template;
mod time;
mod transcode;
pub mod types;

pub use error::IpfixError;
pub use message::{
    BufferCollector, Collector, Exporter, MessageHeader, MessageReader, MessageWriter,
    ReaderCollector, SetHeader, VecExporter, WriterExporter,
};
pub use model::{InfoElement, InfoModel};
pub use record::{BasicList, FieldValue, Record, SubTemplateList, SubTemplateMultiList};
pub use session::{Session, TemplateInfo};
pub use template::Template;
pub use types::{DataType, Semantics, Units, VARLEN};
