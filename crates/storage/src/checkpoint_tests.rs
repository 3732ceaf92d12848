// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::db::StateDb;

#[test]
fn checkpoint_rows_accumulate_in_order() {
    let mut db = StateDb::open_in_memory().unwrap();
    db.apply(&[
        CheckpointEvent::ReloadStart.to_op("t1"),
        CheckpointEvent::ReloadDone.to_op("t2"),
        CheckpointEvent::Shutdown.to_op("t3"),
    ])
    .unwrap();

    let rows = db.checkpoints().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].2, "reload-start");
    assert_eq!(rows[2].2, "shutdown");
    assert!(rows[0].0 < rows[2].0, "ids are monotonic");
}
