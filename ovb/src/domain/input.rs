use media_types::MediaKind;

/// A file attached to a chat message, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Where the bytes can be fetched from: an `http(s)` URL or a local path.
    pub location: String,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, size: u64, location: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            size,
            location: location.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub attachments: Vec<Attachment>,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: id.into(),
            attachments,
        }
    }

    /// Only the first attachment of a message is ever considered.
    pub fn first_attachment(&self) -> Option<&Attachment> {
        self.attachments.first()
    }
}

/// Where a resolved input was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    /// The message the command replied to.
    Reply,
    /// The command message itself.
    CurrentMessage,
    /// A recent channel message; 0 is the newest.
    History(usize),
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reply => f.write_str("reply"),
            Self::CurrentMessage => f.write_str("current message"),
            Self::History(i) => write!(f, "history[{}]", i),
        }
    }
}

/// An attachment that passed classification. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRef {
    pub file_name: String,
    pub size: u64,
    pub kind: MediaKind,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    pub input: InputRef,
    pub source: InputSource,
}
