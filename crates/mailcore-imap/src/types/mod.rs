//! Domain entities produced from server responses.
//!
//! All of these are plain owned values; none of them keeps a handle on the
//! connection that produced it.

mod body_structure;
mod capability;
mod envelope;
mod fetched;
mod folder;
mod server;

pub use body_structure::{BodyStructure, Disposition, MessagePart, MultipartPart, SimplePart};
pub use capability::{Capabilities, IMAP4REV1_COMMANDS};
pub use envelope::{Address, Envelope};
pub use fetched::{BodySection, FetchValue, FetchedMessage};
pub use folder::{Folder, MailboxStats, build_folder_name, escape_name};
pub use server::{Namespace, Namespaces, ServerInfo, UserInfo, string_pairs};
