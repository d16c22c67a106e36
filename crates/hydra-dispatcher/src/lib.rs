// SPDX-License-Identifier: MIT
mod defaults;
mod dispatcher;
mod requests;

pub use dispatcher::Dispatcher;
