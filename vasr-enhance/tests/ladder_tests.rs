//! Out-of-process fallback ladder and wrapper mode
//!
//! The external tool is replaced by small `sh` scripts, so these tests are
//! unix-only. They run serially because they write and execute scripts.
#![cfg(unix)]

mod helpers;

use helpers::fake_tools::{
    fake_ffmpeg, fake_ffmpeg_merge_fails, fake_ffprobe, runner, sh_exact_form, sh_form,
};
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use vasr_enhance::external::probe_log::LOG_DIR_NAME;
use vasr_enhance::external::{wrapper, CommandForm, FallbackLadder, MediaTools, Wrapper};

const INPUT_BYTES: &[u8] = b"RIFF-not-really-audio";

fn no_media() -> MediaTools {
    MediaTools::new("/nonexistent/ffprobe", "/nonexistent/ffmpeg")
}

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.wav");
    fs::write(&input, INPUT_BYTES).unwrap();
    let output = dir.path().join("out").join("out.wav");
    (dir, input, output)
}

fn probe_logs(out_dir: &Path) -> Vec<String> {
    fs::read_dir(out_dir.join(LOG_DIR_NAME))
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| fs::read_to_string(e.path()).unwrap())
                .collect()
        })
        .unwrap_or_default()
}

fn ladder(forms: Vec<CommandForm>, media: MediaTools) -> FallbackLadder {
    FallbackLadder::new(runner(forms), media)
}

// ========================================
// Server ladder
// ========================================

#[test]
#[serial]
fn test_marker_file_in_save_dir_is_delivered() {
    let (_dir, input, output) = setup();
    let ladder = ladder(
        vec![sh_form(r#"printf enhanced > "$2/in_AudioSR_Processed_48K.wav""#)],
        no_media(),
    );

    let response = ladder.run(&input, &output);

    assert_eq!(response.rc, 0, "stderr: {}", response.stderr);
    assert_eq!(fs::read(&output).unwrap(), b"enhanced");

    let logs = probe_logs(output.parent().unwrap());
    assert_eq!(logs.len(), 1);
    assert!(logs[0].contains("--- Attempting command: sh -c"));
    assert!(logs[0].contains("RC=0"));
    assert!(logs[0].contains("Copied produced file"));
}

#[test]
#[serial]
fn test_next_candidate_tried_after_failure() {
    let (_dir, input, output) = setup();
    let ladder = ladder(
        vec![
            sh_form("echo broken >&2; exit 3"),
            CommandForm::new("/nonexistent/audiosr", &["{input}"], Default::default()),
            sh_form(r#"printf second > "$2/result.wav""#),
        ],
        no_media(),
    );

    let response = ladder.run(&input, &output);

    assert_eq!(response.rc, 0);
    assert_eq!(fs::read(&output).unwrap(), b"second");
    let log = &probe_logs(output.parent().unwrap())[0];
    assert!(log.contains("RC=3"));
    assert!(log.contains("broken"));
    assert!(log.contains("Command not found"));
}

#[test]
#[serial]
fn test_failure_exit_with_product_counts_as_success() {
    let (_dir, input, output) = setup();
    let ladder = ladder(vec![sh_form(r#"printf late > "$2/x.flac"; exit 4"#)], no_media());

    let response = ladder.run(&input, &output);

    assert_eq!(response.rc, 0);
    assert_eq!(fs::read(&output).unwrap(), b"late");
    assert!(probe_logs(output.parent().unwrap())[0].contains("despite rc!=0"));
}

#[test]
#[serial]
fn test_exact_output_form() {
    let (_dir, input, output) = setup();
    fs::create_dir_all(output.parent().unwrap()).unwrap();
    let ladder = ladder(vec![sh_exact_form(r#"printf exact > "$2""#)], no_media());

    let response = ladder.run(&input, &output);

    assert_eq!(response.rc, 0);
    assert_eq!(fs::read(&output).unwrap(), b"exact");
}

#[test]
#[serial]
fn test_all_candidates_fail_copies_input() {
    let (_dir, input, output) = setup();
    let ladder = ladder(
        vec![sh_form("exit 2"), sh_form("exit 0")],
        no_media(),
    );

    let response = ladder.run(&input, &output);

    // Last candidate exited 0 but produced nothing
    assert_ne!(response.rc, 0);
    assert!(response.stderr.contains("input copied unchanged"));
    assert_eq!(fs::read(&output).unwrap(), INPUT_BYTES);
}

#[test]
#[serial]
fn test_missing_tool_reports_not_found() {
    let (_dir, input, output) = setup();
    let ladder = ladder(
        vec![CommandForm::new("/nonexistent/audiosr", &["-i", "{input}"], Default::default())],
        no_media(),
    );

    let response = ladder.run(&input, &output);

    assert_eq!(response.rc, 127);
    assert_eq!(fs::read(&output).unwrap(), INPUT_BYTES);
}

#[test]
#[serial]
fn test_stereo_split_enhance_merge() {
    let (dir, input, output) = setup();
    let tools = dir.path().join("tools");
    fs::create_dir_all(&tools).unwrap();
    let media = MediaTools::new(
        &fake_ffprobe(&tools, 2).to_string_lossy(),
        &fake_ffmpeg(&tools).to_string_lossy(),
    );
    // Fails on the whole file, succeeds on each channel file
    let ladder = ladder(
        vec![sh_form(
            r#"case "$1" in
  */left.wav|*/right.wav) printf E > "$2/$(basename "$1" .wav)_AudioSR_Processed_.wav" ;;
  *) exit 5 ;;
esac"#,
        )],
        media,
    );

    let response = ladder.run(&input, &output);

    assert_eq!(response.rc, 0, "stderr: {}", response.stderr);
    assert_eq!(fs::read(&output).unwrap(), b"EE");
    assert!(probe_logs(output.parent().unwrap())[0].contains("Input channels: 2"));
}

fn stereo_media(dir: &Path, merge_fails: bool) -> MediaTools {
    let tools = dir.join("tools");
    fs::create_dir_all(&tools).unwrap();
    let ffmpeg = if merge_fails {
        fake_ffmpeg_merge_fails(&tools)
    } else {
        fake_ffmpeg(&tools)
    };
    MediaTools::new(&fake_ffprobe(&tools, 2).to_string_lossy(), &ffmpeg.to_string_lossy())
}

#[test]
#[serial]
fn test_stereo_nothing_enhanced_copies_input() {
    let (dir, input, output) = setup();
    let ladder = ladder(vec![sh_form("exit 5"), sh_form("exit 3")], stereo_media(dir.path(), false));

    let response = ladder.run(&input, &output);

    assert_ne!(response.rc, 0);
    assert!(response.stderr.contains("no channel produced enhanced output"));
    assert!(response.stderr.contains("input copied unchanged"));
    assert_eq!(fs::read(&output).unwrap(), INPUT_BYTES);
}

#[test]
#[serial]
fn test_stereo_one_channel_enhanced_is_noted() {
    let (dir, input, output) = setup();
    let ladder = ladder(
        vec![sh_form(
            r#"case "$1" in
  */left.wav) printf E > "$2/left_AudioSR_Processed_.wav" ;;
  *) exit 5 ;;
esac"#,
        )],
        stereo_media(dir.path(), false),
    );

    let response = ladder.run(&input, &output);

    assert_eq!(response.rc, 0, "stderr: {}", response.stderr);
    let mut expected = b"E".to_vec();
    expected.extend_from_slice(INPUT_BYTES);
    assert_eq!(fs::read(&output).unwrap(), expected);
    assert!(response.stderr.contains("right channel not enhanced"));
}

#[test]
#[serial]
fn test_stereo_merge_failure_copies_input() {
    let (dir, input, output) = setup();
    let ladder = ladder(
        vec![sh_form(
            r#"case "$1" in
  */left.wav|*/right.wav) printf E > "$2/$(basename "$1" .wav)_AudioSR_Processed_.wav" ;;
  *) exit 5 ;;
esac"#,
        )],
        stereo_media(dir.path(), true),
    );

    let response = ladder.run(&input, &output);

    assert_eq!(response.rc, 1);
    assert!(response.stderr.contains("transcode failed"));
    assert_eq!(fs::read(&output).unwrap(), INPUT_BYTES);
}

#[test]
#[serial]
fn test_stereo_split_failure_copies_input() {
    let (dir, input, output) = setup();
    let tools = dir.path().join("tools");
    fs::create_dir_all(&tools).unwrap();
    let media = MediaTools::new(&fake_ffprobe(&tools, 2).to_string_lossy(), "/nonexistent/ffmpeg");
    let ladder = ladder(vec![sh_form("exit 5")], media);

    let response = ladder.run(&input, &output);

    assert_eq!(response.rc, 1);
    assert!(response.stderr.contains("transcode failed"));
    assert_eq!(fs::read(&output).unwrap(), INPUT_BYTES);
}

// ========================================
// Wrapper mode
// ========================================

fn wrapper_for(forms: Vec<CommandForm>) -> Wrapper {
    Wrapper::new(runner(forms), Duration::from_millis(200), Duration::from_millis(20))
}

#[test]
#[serial]
fn test_wrapper_exact_output() {
    let (_dir, input, output) = setup();
    fs::create_dir_all(output.parent().unwrap()).unwrap();
    let code = wrapper_for(vec![sh_exact_form(r#"printf done > "$2""#)]).run(&input, &output);

    assert_eq!(code, wrapper::EXIT_OK);
    assert_eq!(fs::read(&output).unwrap(), b"done");
}

#[test]
#[serial]
fn test_wrapper_copies_product_from_save_dir() {
    let (_dir, input, output) = setup();
    fs::create_dir_all(output.parent().unwrap()).unwrap();
    let code = wrapper_for(vec![
        sh_form("exit 1"),
        sh_form(r#"printf made > "$2/in_AudioSR_Processed_48K.wav""#),
    ])
    .run(&input, &output);

    assert_eq!(code, wrapper::EXIT_OK);
    assert_eq!(fs::read(&output).unwrap(), b"made");
}

#[test]
#[serial]
fn test_wrapper_fallback_is_byte_identical_copy() {
    let (_dir, input, output) = setup();
    let code = wrapper_for(vec![sh_form("exit 1"), sh_form("exit 7")]).run(&input, &output);

    assert_eq!(code, wrapper::EXIT_OK);
    assert_eq!(fs::read(&output).unwrap(), INPUT_BYTES);
}

#[test]
#[serial]
fn test_wrapper_fallback_copy_failure() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("missing.wav");
    let output = dir.path().join("out.wav");

    let code = wrapper_for(vec![sh_form("exit 1")]).run(&input, &output);

    assert_eq!(code, wrapper::EXIT_FAILED);
    assert!(!output.exists());
}

#[test]
#[serial]
fn test_command_template() {
    let (_dir, input, output) = setup();
    fs::create_dir_all(output.parent().unwrap()).unwrap();
    let runner = runner(Vec::new());

    assert_eq!(wrapper::run_template("cp {input} {output}", &input, &output, &runner), 0);
    assert_eq!(fs::read(&output).unwrap(), INPUT_BYTES);

    assert_eq!(wrapper::run_template("/nonexistent/tool {input}", &input, &output, &runner), 127);
    assert_eq!(wrapper::run_template("   ", &input, &output, &runner), wrapper::EXIT_FAILED);
}
