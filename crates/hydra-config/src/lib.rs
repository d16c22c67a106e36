// SPDX-License-Identifier: MIT
mod loader;
mod logging;
mod schema;

pub use loader::load;
pub use logging::init_logging;
pub use schema::*;
