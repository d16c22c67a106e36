// SPDX-License-Identifier: MIT
mod race;
mod types;
mod validator;

pub use race::{race, race_with_validator};
pub use types::{ConsensusGroup, ConsensusInfo, RaceLoser, SpeculationPolicy, SpeculationResult};
pub use validator::{default_validator, Validator};
