//! SEP ("Simple End Point") routing sub-protocol.
//!
//! SEP messages are ordinary WebSocket text messages with a one-line header:
//!
//! ```text
//! [<contentType> ]<routeName>[:<id>]
//! <payload spanning the rest of the message>
//! ```
//!
//! Examples:
//!
//! | Message                    | content type | route    | id   | body       |
//! |----------------------------|--------------|----------|------|------------|
//! | `ping`                     | –            | `ping`   | –    | –          |
//! | `whoami:42`                | –            | `whoami` | `42` | –          |
//! | `echo\nhello`              | –            | `echo`   | –    | `hello`    |
//! | `json save\n{"v":1}`       | `json`       | `save`   | –    | `{"v":1}`  |
//!
//! This module holds the parts of SEP that need no connection state: the
//! grammar, scalar parsing, the error value, and the id pool.  Route tables
//! and dispatch live in the server crate.

pub mod error;
pub mod ids;
pub mod request;
pub mod scalar;

pub use error::{SepError, SepErrorKind};
pub use ids::IdPool;
pub use request::SepRequest;
pub use scalar::{Scalar, ScalarKind};
