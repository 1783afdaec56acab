//! Driver seam between the gateway and a concrete store client.

use std::future::Future;
use std::pin::Pin;

use dbgrid_core::{Credentials, Endpoint, ProviderResult};

use crate::statement::Statement;

/// Boxed future returned by [`Driver::connect`].
pub type ConnectFuture<'a> =
    Pin<Box<dyn Future<Output = ProviderResult<Box<dyn Session>>> + Send + 'a>>;

/// Boxed future returned by [`Session::execute`] and [`Session::close`].
pub type ExecuteFuture<'a> = Pin<Box<dyn Future<Output = ProviderResult<()>> + Send + 'a>>;

/// An authenticated connection to one store instance.
pub trait Session: Send {
    /// Execute one statement. Failures carry the store's message.
    fn execute<'a>(&'a mut self, statement: &'a Statement) -> ExecuteFuture<'a>;

    /// Close the connection. Dropping a session without closing it is
    /// allowed but skips the orderly goodbye.
    fn close(self: Box<Self>) -> ExecuteFuture<'static>;
}

/// Opens sessions against a store endpoint.
pub trait Driver: Send + Sync {
    fn connect<'a>(
        &'a self,
        endpoint: &'a Endpoint,
        credentials: &'a Credentials,
    ) -> ConnectFuture<'a>;
}
