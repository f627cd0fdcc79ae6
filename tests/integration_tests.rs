use std::env;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use v3bw_plot::dataset::{Dataset, intersection_points, sorted_pairs};
use v3bw_plot::parser::{Pair, read_pairs};

const BIN: &str = env!("CARGO_BIN_EXE_v3bw_plot");

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn temp_path(name: &str) -> PathBuf {
    env::temp_dir().join(name)
}

fn fp(c: char) -> String {
    std::iter::repeat_n(c, 40).collect()
}

#[test]
fn test_full_pipeline() {
    let torflow = Dataset::load(&fixture("torflow.v3bw"), "torflow").expect("Failed to load");
    let sbws = Dataset::load(&fixture("sbws.v3bw"), "sbws").expect("Failed to load");

    assert_eq!(torflow.len(), 3);
    assert_eq!(sbws.len(), 3);

    let points = intersection_points(&torflow, &sbws);
    assert_eq!(points.len(), 2);
    assert_eq!(points[&fp('A')], (1000, 1200));
    assert_eq!(points[&fp('B')], (2000, 1800));

    assert_eq!(sorted_pairs(&sbws, &torflow), vec![(1800, 2000), (1200, 1000)]);
}

#[test]
fn test_both_field_orders_from_files() {
    let file = fs::File::open(fixture("sbws.v3bw")).unwrap();
    let pairs: Vec<Pair> = read_pairs(std::io::BufReader::new(file))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(pairs[0], Pair::new(fp('A'), 1200));
    assert_eq!(pairs[2], Pair::new(fp('D'), 42));
}

#[test]
fn test_parse_subcommand_prints_pairs() {
    let output = Command::new(BIN)
        .args(["parse"])
        .arg(fixture("torflow.v3bw"))
        .arg(fixture("sbws.v3bw"))
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], format!("{} 1000", fp('A')));
    assert_eq!(lines[5], format!("{} 42", fp('D')));
}

#[test]
fn test_compare_writes_output() {
    let out = temp_path("v3bw_plot_it_compare.svg");
    let _ = fs::remove_file(&out);

    let status = Command::new(BIN)
        .arg("compare")
        .arg("-i")
        .arg(fixture("torflow.v3bw"))
        .arg("torflow")
        .arg("-i")
        .arg(fixture("sbws.v3bw"))
        .arg("sbws")
        .arg("-o")
        .arg(&out)
        .status()
        .unwrap();

    assert!(status.success());
    assert!(fs::read_to_string(&out).unwrap().contains("<svg"));
    fs::remove_file(&out).unwrap();
}

#[test]
fn test_compare_with_one_input_fails_without_output() {
    let out = temp_path("v3bw_plot_it_one_input.svg");
    let _ = fs::remove_file(&out);

    let status = Command::new(BIN)
        .arg("compare")
        .arg("-i")
        .arg(fixture("torflow.v3bw"))
        .arg("torflow")
        .arg("-o")
        .arg(&out)
        .status()
        .unwrap();

    assert!(!status.success());
    assert!(!out.exists());
}

#[test]
fn test_compare_with_three_inputs_fails_without_output() {
    let out = temp_path("v3bw_plot_it_three_inputs.svg");
    let _ = fs::remove_file(&out);

    let mut cmd = Command::new(BIN);
    cmd.arg("compare");
    for label in ["a", "b", "c"] {
        cmd.arg("-i").arg(fixture("torflow.v3bw")).arg(label);
    }
    let status = cmd.arg("-o").arg(&out).status().unwrap();

    assert!(!status.success());
    assert!(!out.exists());
}

#[test]
fn test_scatter_writes_output() {
    let out = temp_path("v3bw_plot_it_scatter.svg");
    let _ = fs::remove_file(&out);

    let status = Command::new(BIN)
        .arg("scatter")
        .arg("-i")
        .arg(fixture("sbws.v3bw"))
        .arg("sbws")
        .arg("-i")
        .arg(fixture("torflow.v3bw"))
        .arg("torflow")
        .arg("-t")
        .arg("Scanner agreement")
        .arg("-o")
        .arg(&out)
        .status()
        .unwrap();

    assert!(status.success());
    assert!(out.exists());
    fs::remove_file(&out).unwrap();
}

#[test]
fn test_parse_exits_cleanly_when_reader_closes_early() {
    let path = temp_path("v3bw_plot_it_large.v3bw");
    {
        let mut file = std::io::BufWriter::new(fs::File::create(&path).unwrap());
        for i in 0..200_000u64 {
            writeln!(file, "node_id=${} bw={i}", fp('A')).unwrap();
        }
    }

    for format in ["plain", "csv"] {
        let mut child = Command::new(BIN)
            .args(["parse", "--format", format])
            .arg(&path)
            .env_remove("RUST_LOG")
            .env_remove("LOG_FILE_PATH")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let stdout = child.stdout.take().unwrap();
        let mut first = String::new();
        BufReader::new(stdout).read_line(&mut first).unwrap();
        assert!(!first.is_empty());

        let output = child.wait_with_output().unwrap();
        assert!(output.status.success(), "format {format}");
        assert!(output.stderr.is_empty(), "format {format}");
    }

    fs::remove_file(&path).unwrap();
}

#[test]
fn test_compare_warns_on_duplicate_fingerprint() {
    let out = temp_path("v3bw_plot_it_duplicate.svg");
    let _ = fs::remove_file(&out);

    let output = Command::new(BIN)
        .arg("compare")
        .arg("-i")
        .arg(fixture("duplicate.v3bw"))
        .arg("dup")
        .arg("-i")
        .arg(fixture("torflow.v3bw"))
        .arg("torflow")
        .arg("-o")
        .arg(&out)
        .env_remove("RUST_LOG")
        .env_remove("LOG_FILE_PATH")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("Already saw fingerprint").count(), 1);
    assert_eq!(stderr.matches("Datasets share fingerprints").count(), 1);

    fs::remove_file(&out).unwrap();
}
