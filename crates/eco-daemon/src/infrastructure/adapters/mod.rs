//! OS adapters: the clipboard and notification ports, implemented by running
//! the standard Wayland / freedesktop command-line tools.

pub mod clipboard;
pub mod notify;

pub use clipboard::{ClipboardListener, ClipboardMemory, ListenerHandle, WlClipboard};
pub use notify::NotifySend;
