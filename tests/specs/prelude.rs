// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture for scenario specs.

use tempfile::TempDir;
use weir_core::FakeClock;
use weir_engine::{Engine, EngineConfig};

pub struct Harness {
    pub clock: FakeClock,
    pub engine: Engine<FakeClock>,
    _dir: TempDir,
}

pub fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = FakeClock::new();
    let engine = Engine::open(dir.path(), EngineConfig::default(), clock.clone())
        .expect("engine opens");
    Harness { clock, engine, _dir: dir }
}

/// Variable map literal helper.
#[macro_export]
macro_rules! vars {
    ($( $key:literal => $value:expr ),* $(,)?) => {{
        let mut map = weir_core::VarMap::new();
        $( map.insert($key.to_string(), weir_core::Value::from($value)); )*
        map
    }};
}
