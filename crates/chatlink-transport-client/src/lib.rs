//! chatlink-transport-client
//!
//! Client-side transport for the ChatLink chat server: one TCP connection for
//! text messages and an independent one per file upload. Both speak plain
//! UTF-8 over TCP with no framing, open with a token handshake, and report
//! back through a bounded event channel instead of callbacks.
//!
//! # Architecture
//!
//! ```text
//! caller (UI / CLI)                        chat server
//! ─────────────────                        ───────────
//! ConnectionManager ── TCP (messaging) ──► HANDSHAKE_REQUEST, raw text
//!   └─ receive loop ◄───────────────────── raw text
//! FileUploader ─────── TCP (upload) ─────► FILE_UPLOAD_* control lines + bytes
//!
//! events ◄── mpsc::Receiver<ConnectionEvent> / mpsc::Receiver<UploadEvent>
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use chatlink_core::{ClientConfig, ConnectionEvent};
//! use chatlink_transport_client::ConnectionManager;
//!
//! # async fn demo() {
//! let (mut conn, mut events) = ConnectionManager::new(ClientConfig::default());
//! if conn.connect("192.168.1.100", 9000).await {
//!     conn.send_message("[alice]: hello").await;
//! }
//! while let Some(ev) = events.recv().await {
//!     if let ConnectionEvent::Message(m) = ev {
//!         println!("{}", m.text);
//!     }
//! }
//! conn.disconnect().await;
//! # }
//! ```

mod events;
mod net;
mod recv_loop;

pub mod connection;
pub mod handshake;
pub mod session;
pub mod upload;

pub use connection::ConnectionManager;
pub use handshake::accepts_handshake;
pub use session::UploadSession;
pub use upload::FileUploader;
