//! Shared fixtures for integration tests.

use std::path::{Path, PathBuf};

/// A shell stand-in for ffmpeg.
///
/// Segment runs check that the slide image exists and write
/// `segment <image name>` to the output. Concat runs resolve every `file`
/// entry against the list file's directory, the way ffmpeg's concat demuxer
/// does, and join the segments into the output.
const STUB_FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
  echo "ffmpeg version stub"
  exit 0
fi
for last; do :; done
prev=""
input=""
concat=0
for arg in "$@"; do
  if [ "$prev" = "-f" ] && [ "$arg" = "concat" ]; then concat=1; fi
  if [ "$prev" = "-i" ] && [ -z "$input" ]; then input="$arg"; fi
  prev="$arg"
done
if [ ! -f "$input" ]; then
  echo "$input: No such file or directory" >&2
  exit 1
fi
if [ "$concat" = 1 ]; then
  dir=$(dirname "$input")
  : > "$last"
  while IFS= read -r line; do
    name=${line#file \'}
    name=${name%\'}
    case "$name" in
      /*) entry="$name" ;;
      *) entry="$dir/$name" ;;
    esac
    if [ ! -f "$entry" ]; then
      echo "$entry: No such file or directory" >&2
      exit 1
    fi
    cat "$entry" >> "$last"
  done < "$input"
  exit 0
fi
echo "segment $(basename "$input")" > "$last"
"#;

/// Write the stub into `dir` and return its path.
#[cfg(unix)]
#[allow(dead_code)]
pub fn stub_ffmpeg(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    std::fs::write(&path, STUB_FFMPEG).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

    // ETXTBSY while another test thread is forking with the file still open
    for _ in 0..50 {
        match std::process::Command::new(&path).arg("-version").output() {
            Err(e) if e.raw_os_error() == Some(libc::ETXTBSY) => {
                std::thread::sleep(std::time::Duration::from_millis(20));
            }
            _ => break,
        }
    }
    path
}

/// Every file under `root`, as sorted paths relative to it.
#[allow(dead_code)]
pub fn relative_files(root: &Path) -> Vec<PathBuf> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }

    let mut files = Vec::new();
    walk(root, root, &mut files);
    files.sort();
    files
}
