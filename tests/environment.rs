use std::sync::Once;

use runproc::{AbsolutePath, EnvironmentInheritance, ProcessSpec, run_process};

const PARENT_VARIABLE: &str = "runproc_parent_key=parent_value";

fn set_parent_variable() {
    static SET: Once = Once::new();
    SET.call_once(|| {
        // SAFETY: no test in this binary reads the environment through libc
        // while it is being modified; all tests wait for this call.
        unsafe { std::env::set_var("runproc_parent_key", "parent_value") };
    });
}

fn print_environment(inheritance: EnvironmentInheritance, additional: &[(&str, &str)]) -> String {
    set_parent_variable();
    #[cfg(unix)]
    let spec = ProcessSpec::new(
        AbsolutePath::new("/usr/bin/env").unwrap(),
        AbsolutePath::current_dir().unwrap(),
    );
    #[cfg(windows)]
    let spec = ProcessSpec::new(
        AbsolutePath::new(r"C:\Windows\System32\cmd.exe").unwrap(),
        AbsolutePath::current_dir().unwrap(),
    )
    .args(["/C", "set"]);

    let mut output = Vec::new();
    let code = run_process(
        spec.envs(additional.iter().copied())
            .inheritance(inheritance)
            .output(&mut output),
    )
    .unwrap();
    assert_eq!(code, 0);
    String::from_utf8_lossy(&output).into_owned()
}

fn check(inheritance: EnvironmentInheritance, additional: &[(&str, &str)]) {
    let output = print_environment(inheritance, additional);
    for (key, value) in additional {
        assert!(output.contains(&format!("{key}={value}")), "{output}");
    }
    let parent_found = output.contains(PARENT_VARIABLE);
    match inheritance {
        EnvironmentInheritance::Inherit => assert!(parent_found, "{output}"),
        EnvironmentInheritance::NoInherit => assert!(!parent_found, "{output}"),
    }
}

#[test]
fn inherit_additional_vars() {
    check(EnvironmentInheritance::Inherit, &[("key", "value")]);
}

#[test]
fn no_inherit_additional_vars() {
    check(EnvironmentInheritance::NoInherit, &[("key", "value")]);
}

#[test]
fn inherit() {
    check(EnvironmentInheritance::Inherit, &[]);
}

#[test]
fn no_inherit() {
    check(EnvironmentInheritance::NoInherit, &[]);
}

#[test]
fn additional_variable_overrides_parent() {
    let output = print_environment(
        EnvironmentInheritance::Inherit,
        &[("runproc_parent_key", "overridden")],
    );
    assert!(output.contains("runproc_parent_key=overridden"), "{output}");
    assert!(!output.contains(PARENT_VARIABLE), "{output}");
}

#[test]
fn later_definition_wins() {
    let output = print_environment(
        EnvironmentInheritance::NoInherit,
        &[("key", "first"), ("key", "second")],
    );
    assert!(output.contains("key=second"), "{output}");
    assert!(!output.contains("key=first"), "{output}");
}
