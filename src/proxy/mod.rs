mod server;
mod stream;

pub use server::{router, ProxyState};
