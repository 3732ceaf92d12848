// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rota_config::PlatformDef;

fn platform(kind: JobRunnerKind) -> PlatformDef {
    let mut def = PlatformDef::localhost();
    def.job_runner = kind;
    def
}

#[yare::parameterized(
    slurm = { JobRunnerKind::Slurm, "Submitted batch job 4242\n", "4242" },
    lsf   = { JobRunnerKind::Lsf, "Job <77> is submitted to default queue <normal>.\n", "77" },
    pbs   = { JobRunnerKind::Pbs, "12345.pbsserver\n", "12345.pbsserver" },
    at    = { JobRunnerKind::At, "warning: commands will be executed using /bin/sh\njob 9 at Thu Jan  1\n", "9" },
    background = { JobRunnerKind::Background, "31337\n", "31337" },
    loadleveler = { JobRunnerKind::Loadleveler, "llsubmit: The job \"host.42.0\" has been submitted.\n", "host.42.0" },
)]
fn job_id_extraction(kind: JobRunnerKind, stdout: &str, expected: &str) {
    let def = platform(kind);
    assert_eq!(parse_job_id(&def, stdout).unwrap(), expected);
}

#[test]
fn missing_job_id_is_an_error() {
    let def = platform(JobRunnerKind::Slurm);
    assert!(matches!(
        parse_job_id(&def, "sbatch: error: invalid partition\n"),
        Err(PlatformError::NoJobId { .. })
    ));
}

#[yare::parameterized(
    pending    = { "PENDING\n", PollStatus::Queued },
    running    = { "RUNNING\n", PollStatus::RunningNow },
    completing = { "COMPLETING\n", PollStatus::RunningNow },
    gone       = { "", PollStatus::Exited },
)]
fn slurm_poll_states(stdout: &str, expected: PollStatus) {
    let def = platform(JobRunnerKind::Slurm);
    assert_eq!(parse_poll(&def, 0, stdout, "1"), expected);
}

#[test]
fn background_poll_matches_pid() {
    let def = platform(JobRunnerKind::Background);
    assert_eq!(parse_poll(&def, 0, " 4242\n", "4242"), PollStatus::RunningNow);
    assert_eq!(parse_poll(&def, 1, "", "4242"), PollStatus::Exited);
}

#[test]
fn lsf_poll_states() {
    let def = platform(JobRunnerKind::Lsf);
    assert_eq!(parse_poll(&def, 0, "PEND\n", "7"), PollStatus::Queued);
    assert_eq!(parse_poll(&def, 0, "RUN\n", "7"), PollStatus::RunningNow);
    assert_eq!(parse_poll(&def, 0, "DONE\n", "7"), PollStatus::Exited);
}

#[test]
fn submit_commands_name_the_script() {
    let def = platform(JobRunnerKind::Slurm);
    assert_eq!(
        submit_command(&def, "/run/log/job/1/t/01/job", "/run/log/job/1/t/01").unwrap(),
        "sbatch /run/log/job/1/t/01/job"
    );
    let bg = platform(JobRunnerKind::Background);
    let cmd = submit_command(&bg, "/p/job", "/p").unwrap();
    assert!(cmd.contains("nohup bash /p/job"));
    assert!(cmd.contains("echo $!"));
}

#[test]
fn kill_commands() {
    assert_eq!(
        kill_command(&platform(JobRunnerKind::Slurm), "9").unwrap(),
        "scancel 9"
    );
    assert_eq!(
        kill_command(&platform(JobRunnerKind::Background), "9").unwrap(),
        "kill -TERM 9"
    );
}

#[test]
fn custom_templates_expand_holes() {
    let mut def = platform(JobRunnerKind::Custom);
    def.submit_command_template = Some("mysubmit --script={script}".to_string());
    def.poll_command_template = Some("mypoll {job_id}".to_string());
    def.kill_command_template = Some("mykill {job_id}".to_string());
    def.job_id_pattern = Some(r"id=(\S+)".to_string());

    assert_eq!(
        submit_command(&def, "/j/job", "/j").unwrap(),
        "mysubmit --script=/j/job"
    );
    assert_eq!(poll_command(&def, "abc").unwrap(), "mypoll abc");
    assert_eq!(kill_command(&def, "abc").unwrap(), "mykill abc");
    assert_eq!(parse_job_id(&def, "ok id=j-17\n").unwrap(), "j-17");
}

#[test]
fn custom_without_template_is_an_error() {
    let def = platform(JobRunnerKind::Custom);
    assert!(matches!(
        submit_command(&def, "/j/job", "/j"),
        Err(PlatformError::BadTemplate { .. })
    ));
}
