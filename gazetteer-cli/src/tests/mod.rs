//! Shared test harness modules for the gazetteer CLI.

use super::*;

mod helpers;
