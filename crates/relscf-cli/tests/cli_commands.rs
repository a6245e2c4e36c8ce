use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const HELIUM_CONFIG: &str = r#"
{
  "label": "He",
  "z": 2,
  "grid": { "r0": 1e-6, "rmax": 50.0, "points": 2000 },
  "core": "[He]",
  "scf": { "method": "approx_hartree_fock", "energy_tolerance": 1e-7 }
}
"#;

fn relscf(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_relscf"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("relscf should run")
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent directory should be created");
    }
    fs::write(path, contents).expect("file should be written");
}

#[test]
fn hydrogenic_command_reports_the_exact_energies() {
    let output = relscf(&["hydrogenic", "--z", "1", "--orbitals", "1s,2p-"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("1s"), "stdout: {stdout}");
    assert!(stdout.contains("2p-"), "stdout: {stdout}");
    // Dirac 1s of hydrogen: -0.50000666 Ha.
    assert!(stdout.contains("-0.500006"), "stdout: {stdout}");
}

#[test]
fn run_command_writes_a_json_summary() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config_path = temp.path().join("he.json");
    let summary_path = temp.path().join("out/summary.json");
    write_file(&config_path, HELIUM_CONFIG);

    let output = relscf(&[
        "run",
        config_path.to_str().expect("utf-8 path"),
        "--json",
        summary_path.to_str().expect("utf-8 path"),
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("converged"), "stdout: {stdout}");
    assert!(stdout.contains("core energy"), "stdout: {stdout}");

    let summary: Value = serde_json::from_str(
        &fs::read_to_string(&summary_path).expect("summary should be written"),
    )
    .expect("summary should be valid JSON");
    assert_eq!(summary["label"], "He");
    assert_eq!(summary["state"], "converged");
    assert_eq!(summary["method"], "approx_hartree_fock");
    let energy = summary["core"][0]["energy"].as_f64().expect("1s energy");
    assert!((energy + 0.91799).abs() < 1.0e-3, "1s energy {energy}");
    let total = summary["core_energy"].as_f64().expect("core energy");
    assert!((total + 2.86181).abs() < 5.0e-3, "core energy {total}");
    assert_eq!(summary["valence"].as_array().map(Vec::len), Some(0));
}

#[test]
fn run_command_solves_valence_orbitals() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config_path = temp.path().join("li.json");
    write_file(
        &config_path,
        r#"
        {
          "label": "Li",
          "z": 3,
          "grid": { "r0": 1e-6, "rmax": 60.0, "points": 2500 },
          "core": "[He]",
          "valence": ["2s"],
          "scf": { "energy_tolerance": 1e-7 }
        }
        "#,
    );

    let output = relscf(&["run", config_path.to_str().expect("utf-8 path")]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("valence:"), "stdout: {stdout}");
    assert!(stdout.contains("2s"), "stdout: {stdout}");
    assert!(stdout.contains("hartree_fock"), "stdout: {stdout}");
}

#[test]
fn missing_configuration_is_an_io_failure() {
    let temp = TempDir::new().expect("tempdir should be created");
    let missing = temp.path().join("absent.json");
    let output = relscf(&["run", missing.to_str().expect("utf-8 path")]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(3), "stderr: {stderr}");
    assert!(stderr.contains("ERROR: [CONFIG.LOAD]"), "stderr: {stderr}");
    assert!(stderr.contains("FATAL EXIT CODE: 3"), "stderr: {stderr}");
}

#[test]
fn invalid_configuration_is_a_configuration_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config_path = temp.path().join("bad.json");
    write_file(&config_path, r#"{ "z": 2, "core": "[He]", "colour": "blue" }"#);
    let output = relscf(&["run", config_path.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(2));

    write_file(&config_path, r#"{ "z": 2, "core": "1s3" }"#);
    let output = relscf(&["run", config_path.to_str().expect("utf-8 path")]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(2), "stderr: {stderr}");
}

#[test]
fn exhausted_scf_budget_uses_the_non_convergence_exit_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config_path = temp.path().join("ne.json");
    let summary_path = temp.path().join("ne-summary.json");
    write_file(
        &config_path,
        r#"
        {
          "z": 10,
          "grid": { "points": 2000, "rmax": 50.0 },
          "core": "[Ne]",
          "scf": { "method": "hartree", "max_iterations": 1, "energy_tolerance": 1e-14 }
        }
        "#,
    );

    let output = relscf(&[
        "run",
        config_path.to_str().expect("utf-8 path"),
        "--json",
        summary_path.to_str().expect("utf-8 path"),
    ]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(6), "stderr: {stderr}");
    assert!(stderr.contains("[RUN.SCF]"), "stderr: {stderr}");

    let summary: Value = serde_json::from_str(
        &fs::read_to_string(&summary_path).expect("best iterate should be written"),
    )
    .expect("summary should be valid JSON");
    assert_eq!(summary["state"], "failed");
    assert!(summary["core_energy"].is_null());
    assert_eq!(summary["core"].as_array().map(Vec::len), Some(4));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let output = relscf(&["transmogrify"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr.contains("INPUT.CLI_USAGE"), "stderr: {stderr}");
}
