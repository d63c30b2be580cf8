pub mod host_id;
pub mod init;
pub mod keys;
pub mod record;
pub mod subscribe;
pub mod thread;
pub mod token;

pub use host_id::HostId;
pub use init::Init;
pub use keys::Keys;
pub use record::Record;
pub use subscribe::Subscribe;
pub use thread::Thread;
pub use token::Token;
