use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::clean::{CleanStats, check_input, clean_lines, limit_queries, repair_line};
use super::log::EvalLog;
use super::run::{EvalOptions, append_summary, evaluate_run, run, run_label};
use super::trec_eval::{extract_metric, metric_tag};
use crate::cli::{EvaluateArgs, LabelStyle};

fn temp_log(dir: &TempDir) -> EvalLog {
    EvalLog::create(&dir.path().join("eval.log")).expect("log should be created")
}

fn clean_text(input: &str, max_docs: Option<usize>, log: &EvalLog) -> (String, CleanStats) {
    let mut output = Vec::new();
    let stats = clean_lines(Cursor::new(input), &mut output, max_docs, "fixture", log)
        .expect("cleaning should succeed");
    (String::from_utf8(output).expect("utf8"), stats)
}

#[test]
fn repair_line_reconstructs_short_lines_with_defaults() {
    let (query_id, line, reconstructed) = repair_line("3 Q0 docB").expect("three fields");
    assert_eq!(query_id, "3");
    assert_eq!(line, "3 Q0 docB 1000 0.0 AUTO");
    assert!(reconstructed);

    let (_, line, _) = repair_line("3 Q0 docB top 0.7").expect("five fields");
    assert_eq!(line, "3 Q0 docB 1000 0.7 AUTO");

    let (_, line, _) = repair_line("3 x docB 4 high tag").expect("six fields");
    assert_eq!(line, "3 Q0 docB 4 0.0 tag");

    assert!(repair_line("3 Q0").is_none());
}

#[test]
fn repair_line_passes_well_formed_lines_through() {
    let (_, line, reconstructed) =
        repair_line("  1 Q0 docA 3 0.55 runX ").expect("well-formed line");
    assert_eq!(line, "1 Q0 docA 3 0.55 runX");
    assert!(!reconstructed);
}

#[test]
fn clean_lines_drops_malformed_and_logs_them() {
    let dir = TempDir::new().expect("temp dir");
    let log = temp_log(&dir);

    let (output, stats) = clean_text("1 Q0 a 1 0.9 r\n\nbad line\n1 Q0 b\n", None, &log);
    assert_eq!(output, "1 Q0 a 1 0.9 r\n1 Q0 b 1000 0.0 AUTO\n");
    assert_eq!(stats.written, 2);
    assert_eq!(stats.reconstructed, 1);
    assert_eq!(stats.malformed, 1);

    let logged = fs::read_to_string(log.path()).expect("read log");
    assert!(logged.contains("Malformed line 3 in fixture: bad line"));
    assert!(logged.contains("Skipping empty line 2 in fixture"));
}

#[test]
fn doc_cap_limits_lines_per_query_and_resets_on_change() {
    let dir = TempDir::new().expect("temp dir");
    let log = temp_log(&dir);
    let input = "1 Q0 a 1 1 r\n1 Q0 b 2 1 r\nxx\n1 Q0 c 3 1 r\n2 Q0 d 1 1 r\n2 Q0 e 2 1 r\n2 Q0 f 3 1 r\n";

    let (output, stats) = clean_text(input, Some(2), &log);
    let mut per_query: HashMap<&str, usize> = HashMap::new();
    for line in output.lines() {
        *per_query
            .entry(line.split_whitespace().next().expect("qid"))
            .or_default() += 1;
    }
    assert_eq!(per_query.get("1"), Some(&2));
    assert_eq!(per_query.get("2"), Some(&2));
    assert_eq!(stats.capped, 2);
    assert!(!output.contains(" c "));
}

#[test]
fn limit_queries_admits_by_first_appearance() {
    let input = "1 Q0 a 1 1 r\n2 Q0 b 1 1 r\n3 Q0 c 1 1 r\n\n1 Q0 d 2 1 r\n3 Q0 e 2 1 r\n";
    let mut output = Vec::new();

    let written = limit_queries(Cursor::new(input), &mut output, 2).expect("limit");
    assert_eq!(written, 3);
    assert_eq!(
        String::from_utf8(output).expect("utf8"),
        "1 Q0 a 1 1 r\n2 Q0 b 1 1 r\n1 Q0 d 2 1 r\n"
    );
}

#[test]
fn extract_metric_reads_third_field_of_tagged_line() {
    let stdout = "runid                 \tall\tbm25\nndcg_cut_20           \tall\t0.4871\n";
    assert_eq!(metric_tag("ndcg_cut.20"), "ndcg_cut_20");
    assert_eq!(
        extract_metric(stdout, "ndcg_cut_20"),
        Some("0.4871".to_string())
    );
    assert_eq!(extract_metric("ndcg_cut_20 all\n", "ndcg_cut_20"), None);
    assert_eq!(extract_metric("", "ndcg_cut_20"), None);
}

#[test]
fn check_input_rejects_missing_and_empty_files() {
    let dir = TempDir::new().expect("temp dir");
    let empty = dir.path().join("empty.run");
    fs::write(&empty, "").expect("write empty");

    let missing = check_input(&dir.path().join("missing.run")).expect_err("missing file");
    assert!(missing.to_string().contains("Cannot read"));
    let empty = check_input(&empty).expect_err("empty file");
    assert!(empty.to_string().contains("is empty"));
    assert!(check_input(dir.path()).is_err());
}

#[test]
fn run_label_follows_style() {
    let root = Path::new("/runs");
    let file = Path::new("/runs/bm25/cv-5fold-run-test.run");
    assert_eq!(
        run_label(root, file, LabelStyle::FileName),
        "cv-5fold-run-test.run"
    );
    assert_eq!(
        run_label(root, file, LabelStyle::RelativePath),
        "bm25/cv-5fold-run-test.run"
    );
}

#[test]
fn append_summary_accumulates_lines() {
    let dir = TempDir::new().expect("temp dir");
    let summary = dir.path().join("summary.txt");
    append_summary(&summary, "a.run", "0.1").expect("first");
    append_summary(&summary, "b.run", "0.2").expect("second");
    assert_eq!(
        fs::read_to_string(&summary).expect("read summary"),
        "a.run 0.1\nb.run 0.2\n"
    );
}

#[cfg(unix)]
fn fake_evaluator(dir: &TempDir, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("fake_trec_eval.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut permissions = fs::metadata(&path).expect("script metadata").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).expect("chmod script");
    path
}

#[cfg(unix)]
fn options(dir: &TempDir, evaluator: PathBuf) -> EvalOptions {
    let qrels = dir.path().join("qrels.txt");
    fs::write(&qrels, "1 0 a 1\n").expect("write qrels");
    EvalOptions {
        qrels,
        clean: true,
        max_queries: None,
        max_docs_per_query: None,
        trec_eval: evaluator,
        metric: "ndcg_cut.20".to_string(),
        output_name: None,
    }
}

#[cfg(unix)]
#[test]
fn evaluate_run_reports_metric_from_evaluator_output() {
    let dir = TempDir::new().expect("temp dir");
    // Reports the number of run lines it was given as the metric value.
    let evaluator = fake_evaluator(
        &dir,
        r#"n=$(grep -c . "$4"); printf 'ndcg_cut_20\tall\t%s\n' "$n""#,
    );
    let log = temp_log(&dir);
    let run_file = dir.path().join("system.run");
    fs::write(
        &run_file,
        "1 Q0 a 1 0.9 r\n1 Q0 b 2 0.8 r\n2 Q0 c\nbroken\n3 Q0 d 1 0.7 r\n",
    )
    .expect("write run");

    let mut opts = options(&dir, evaluator);
    assert_eq!(
        evaluate_run(&run_file, &opts, &log).expect("evaluation"),
        "4"
    );

    opts.max_queries = Some(2);
    opts.max_docs_per_query = Some(1);
    opts.output_name = Some("ndcg_scores.txt".to_string());
    assert_eq!(
        evaluate_run(&run_file, &opts, &log).expect("capped evaluation"),
        "2"
    );
    let scores = fs::read_to_string(dir.path().join("ndcg_scores.txt")).expect("scores");
    assert!(scores.starts_with("ndcg_cut_20"));

    let logged = fs::read_to_string(log.path()).expect("read log");
    assert!(logged.contains("First 5 lines of"));
    assert!(logged.contains("Malformed line 4"));
}

#[cfg(unix)]
#[test]
fn evaluate_run_fails_on_evaluator_error_or_unparseable_output() {
    let dir = TempDir::new().expect("temp dir");
    let log = temp_log(&dir);
    let run_file = dir.path().join("system.run");
    fs::write(&run_file, "1 Q0 a 1 0.9 r\n").expect("write run");

    let failing = fake_evaluator(&dir, "echo 'bad qrels' >&2; exit 3");
    let err = evaluate_run(&run_file, &options(&dir, failing), &log)
        .expect_err("non-zero exit should fail");
    assert!(format!("{err:#}").contains("failed for"));
    assert!(
        fs::read_to_string(log.path())
            .expect("read log")
            .contains("bad qrels")
    );

    let silent_dir = TempDir::new().expect("temp dir");
    let silent = fake_evaluator(&silent_dir, "echo 'map all 0.3'");
    let err = evaluate_run(&run_file, &options(&silent_dir, silent), &log)
        .expect_err("missing metric should fail");
    assert!(format!("{err:#}").contains("Could not parse ndcg_cut_20"));
}

#[cfg(unix)]
#[test]
fn batch_evaluation_continues_past_failed_runs_and_resets_summary() {
    let dir = TempDir::new().expect("temp dir");
    let evaluator = fake_evaluator(&dir, "printf 'ndcg_cut_20\tall\t0.5\n'");
    let qrels = dir.path().join("qrels.txt");
    fs::write(&qrels, "1 0 a 1\n").expect("write qrels");

    let runs_dir = dir.path().join("runs");
    fs::create_dir_all(&runs_dir).expect("create runs dir");
    fs::write(runs_dir.join("a.run"), "1 Q0 a 1 0.9 r\n").expect("write good run");
    fs::write(runs_dir.join("b.run"), "").expect("write empty run");
    fs::write(runs_dir.join("c.run"), "broken\nalso broken\n").expect("write malformed run");

    let summary = dir.path().join("summary.txt");
    fs::write(&summary, "stale.run 0.9\n").expect("write stale summary");
    let manifest_path = dir.path().join("manifest.json");

    run(EvaluateArgs {
        qrels,
        runs_dir,
        pattern: "*.run".to_string(),
        summary: summary.clone(),
        log_file: dir.path().join("eval.log"),
        no_clean: false,
        label_style: LabelStyle::FileName,
        output_name: None,
        max_queries: None,
        max_docs_per_query: None,
        trec_eval: evaluator,
        metric: "ndcg_cut.20".to_string(),
        manifest_path: Some(manifest_path.clone()),
    })
    .expect("batch should finish");

    assert_eq!(
        fs::read_to_string(&summary).expect("read summary"),
        "a.run 0.5\n"
    );

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&manifest_path).expect("read manifest"))
            .expect("manifest json");
    assert_eq!(manifest["evaluated_count"], 1);
    assert_eq!(manifest["skipped_count"], 2);
    let runs = manifest["runs"].as_array().expect("runs array");
    let statuses: Vec<(&str, &str)> = runs
        .iter()
        .map(|entry| {
            (
                entry["label"].as_str().expect("label"),
                entry["status"].as_str().expect("status"),
            )
        })
        .collect();
    assert_eq!(
        statuses,
        vec![("a.run", "evaluated"), ("b.run", "skipped"), ("c.run", "skipped")]
    );

    let reason = runs[2]["failure_reason"].as_str().expect("failure reason");
    assert!(reason.contains("Cleaned output of"));
    assert!(reason.contains("c.run is empty"));
}

#[test]
fn evaluate_run_skips_empty_input_before_invoking_evaluator() {
    let dir = TempDir::new().expect("temp dir");
    let log = temp_log(&dir);
    let run_file = dir.path().join("empty.run");
    fs::write(&run_file, "").expect("write run");

    let opts = EvalOptions {
        qrels: dir.path().join("qrels.txt"),
        clean: true,
        max_queries: None,
        max_docs_per_query: None,
        trec_eval: dir.path().join("does-not-exist"),
        metric: "ndcg_cut.20".to_string(),
        output_name: None,
    };
    let err = evaluate_run(&run_file, &opts, &log).expect_err("empty run should be skipped");
    assert!(err.to_string().contains("is empty"));
}
