mod common;

use std::ffi::OsString;

use crate::pump::StopSignal;
use crate::tests::common::cwd;
use crate::{
    AbsolutePath, AsyncProcess, ChildEnds, EnvironmentInheritance, Error, ExitStatus,
    LaunchParams, Pipe, ProcessHandle, ProcessSpec,
};

fn assert_send_sync<T: Send + Sync>() {}
fn assert_send<T: Send>() {}

#[test]
fn public_types_are_send_and_sync() {
    assert_send_sync::<AbsolutePath>();
    assert_send_sync::<AsyncProcess>();
    assert_send_sync::<ChildEnds>();
    assert_send_sync::<Error>();
    assert_send_sync::<ExitStatus>();
    assert_send_sync::<LaunchParams>();
    assert_send_sync::<Pipe>();
    assert_send_sync::<ProcessHandle>();
    assert_send_sync::<StopSignal>();
    assert_send::<ProcessSpec<'static>>();
}

#[test]
fn spec_builds_launch_params() {
    let exe = cwd().join("tool");
    let spec = ProcessSpec::new(exe.clone(), cwd())
        .arg("-v")
        .args(["a", "b"])
        .env("K", "1")
        .envs([("L", "2"), ("K", "3")])
        .inheritance(EnvironmentInheritance::NoInherit)
        .die_with_parent(false);
    let params = spec.params();
    assert_eq!(params.executable, exe);
    assert_eq!(params.current_dir, cwd());
    assert_eq!(params.arguments, ["-v", "a", "b"].map(OsString::from));
    let env: Vec<(OsString, OsString)> = [("K", "1"), ("L", "2"), ("K", "3")]
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    assert_eq!(params.environment, env);
    assert_eq!(params.inheritance, EnvironmentInheritance::NoInherit);
    assert!(!params.die_with_parent);
}

#[test]
fn spec_defaults() {
    let params = ProcessSpec::new(cwd().join("tool"), cwd()).params().clone();
    assert!(params.arguments.is_empty());
    assert!(params.environment.is_empty());
    assert_eq!(params.inheritance, EnvironmentInheritance::Inherit);
    assert!(params.die_with_parent);
}
