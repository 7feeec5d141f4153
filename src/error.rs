//! Error type for all fallible codec operations.

use thiserror::Error;

/// Comprehensive error type for IPFIX encoding and decoding operations.
///
/// Wire-format errors abort the current record or message and propagate.
/// Recoverable conditions (a missing external template, a bad template
/// record inside an otherwise good template set, sequence-number drift) are
/// *not* errors: they are logged with [`log::warn!`] and the offending set,
/// record, or list body is skipped.
#[derive(Debug, Error)]
pub enum IpfixError {
    /// The current message has no room for the requested operation.
    ///
    /// Retryable: with auto-next-message enabled the buffer flushes (write
    /// side) or fetches the next message (read side) and retries once.
    #[error("end of message")]
    EndOfMessage,

    /// The byte source is exhausted. Terminal on the read side.
    #[error("end of stream")]
    EndOfStream,

    /// The output buffer or in-memory collector cannot hold a whole message.
    #[error("insufficient buffer space: {0}")]
    BufferSize(String),

    /// Malformed wire data: bad version, bad set length, reserved set ID,
    /// truncated record, or an inconsistent structured-data header.
    #[error("malformed IPFIX message: {0}")]
    Malformed(String),

    /// A template was required but is unknown, or a template operation was
    /// attempted in an invalid state.
    #[error("template error: {0}")]
    Template(String),

    /// An internal template uses defaulted (not explicitly specified) field
    /// lengths. Forward-compatibility guard on the internal side.
    #[error("internal template {0} uses defaulted field lengths")]
    LaxSize(u16),

    /// Transport-layer failure surfaced through an [`Exporter`] or
    /// [`Collector`] collaborator.
    ///
    /// [`Exporter`]: crate::message::Exporter
    /// [`Collector`]: crate::message::Collector
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A transcoding combination the codec does not implement, such as
    /// fixed-length to variable-length string conversion.
    #[error("unsupported transcoding: {0}")]
    Unsupported(String),

    /// A field specification references an information element that is not
    /// present in the model.
    #[error("unknown information element: {0}")]
    NoElement(String),

    /// An RFC 5610 option record describes an element the model must
    /// reject: reserved enterprise number, duplicate identity, or name
    /// collision.
    #[error("invalid element definition: {0}")]
    InvalidElement(String),
}

impl IpfixError {
    /// True for conditions that auto-next-message is allowed to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IpfixError::EndOfMessage)
    }
}
