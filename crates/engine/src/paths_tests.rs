// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rota_core::point::CyclePoint;
use std::path::PathBuf;

fn task() -> TaskId {
    TaskId::new("foo", CyclePoint::Integer(3))
}

#[test]
fn job_paths_follow_the_layout() {
    let run = PathBuf::from("/run/wf");
    assert_eq!(
        job_dir(&run, &task(), 2),
        PathBuf::from("/run/wf/log/job/3/foo/02")
    );
    assert_eq!(
        job_script_path(&run, &task(), 2),
        PathBuf::from("/run/wf/log/job/3/foo/02/job")
    );
    assert_eq!(
        job_status_path(&run, &task(), 2),
        PathBuf::from("/run/wf/log/job/3/foo/02/job.status")
    );
}

#[test]
fn service_paths() {
    let run = PathBuf::from("/run/wf");
    assert_eq!(db_path(&run), PathBuf::from("/run/wf/.service/db"));
    assert_eq!(contact_path(&run), PathBuf::from("/run/wf/.service/contact"));
    assert_eq!(secret_path(&run), PathBuf::from("/run/wf/.service/secret"));
}

#[test]
fn job_token_zero_pads() {
    assert_eq!(job_token(&task(), 7), "3/foo/07");
}

#[test]
fn work_and_share_dirs() {
    let run = PathBuf::from("/run/wf");
    assert_eq!(share_dir(&run), PathBuf::from("/run/wf/share"));
    assert_eq!(work_dir(&run, &task()), PathBuf::from("/run/wf/work/3/foo"));
}
