//! Shell-script stand-ins for the external enhancement and media tools

use std::path::{Path, PathBuf};
use vasr_enhance::external::{CandidateRunner, CommandForm, OutputHint, ProcessEnv};

/// Form running `script` with `$1` = input and `$2` = save dir
pub fn sh_form(script: &str) -> CommandForm {
    CommandForm::new("sh", &["-c", script, "sh", "{input}", "{save_dir}"], OutputHint::SaveDir)
}

/// Form running `script` with `$1` = input and `$2` = exact output path
pub fn sh_exact_form(script: &str) -> CommandForm {
    CommandForm::new("sh", &["-c", script, "sh", "{input}", "{output}"], OutputHint::Exact)
}

pub fn runner(forms: Vec<CommandForm>) -> CandidateRunner {
    CandidateRunner::new(
        forms,
        "python3",
        "basic",
        ProcessEnv {
            device: "cpu".to_string(),
            threads: 1,
        },
    )
}

/// Write an executable shell script
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Fake ffprobe reporting a fixed channel count
#[cfg(unix)]
pub fn fake_ffprobe(dir: &Path, channels: u32) -> PathBuf {
    write_script(dir, "ffprobe", &format!("echo {}", channels))
}

/// Fake ffmpeg: split copies the input to both channel files, merge
/// concatenates the two channel files
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "ffmpeg",
        r#"case "$4" in
  -map_channel) cp "$3" "$6" && cp "$3" "$9" ;;
  -i) cat "$3" "$5" > "${10}" ;;
  *) exit 1 ;;
esac"#,
    )
}

/// Fake ffmpeg that splits like [`fake_ffmpeg`] but fails every merge
#[cfg(unix)]
pub fn fake_ffmpeg_merge_fails(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "ffmpeg",
        r#"case "$4" in
  -map_channel) cp "$3" "$6" && cp "$3" "$9" ;;
  -i) echo "amerge: cannot merge" >&2; exit 1 ;;
  *) exit 1 ;;
esac"#,
    )
}
