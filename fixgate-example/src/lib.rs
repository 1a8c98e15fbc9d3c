/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # fixgate examples
//!
//! Runnable demos live under `examples/`:
//!
//! - `acceptor_pool`: authenticates two counterparties, hands the accepted
//!   session to a worker thread and back, then disconnects it
//!
//! ```bash
//! RUST_LOG=debug cargo run -p fixgate-example --example acceptor_pool
//! ```

pub use fixgate::prelude;
