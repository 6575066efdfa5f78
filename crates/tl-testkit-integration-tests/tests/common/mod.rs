//! Stand-in compiler used by the end-to-end tests
//!
//! A POSIX shell script speaking just enough of the tl CLI:
//! - `check <file>...` reports `<file>:<line>:<col>: got string, expected
//!   number` for every `number = "` it finds and exits 1 if it found any
//! - `gen <file> [-o <out>]` copies the source to `<out>` (default: the
//!   same stem with `.lua`)
//! - `run` prints the interpreter search path it was given
//! - `build` prints a fixed message

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tl_testkit::HarnessConfig;

const STAND_IN: &str = r#"cmd="$1"
shift
case "$cmd" in
  check)
    status=0
    for f in "$@"; do
      if [ ! -f "$f" ]; then
        echo "cannot open $f"
        status=1
        continue
      fi
      report=$(awk -v file="$f" 'index($0, "number = \"") { printf "%s:%d:%d: got string, expected number\n", file, NR, index($0, "\"") }' "$f")
      if [ -n "$report" ]; then
        echo "========================================"
        echo "$report"
        status=1
      fi
    done
    exit $status
    ;;
  gen)
    src=""
    out=""
    while [ $# -gt 0 ]; do
      case "$1" in
        -o) out="$2"; shift 2 ;;
        *) src="$1"; shift ;;
      esac
    done
    [ -n "$out" ] || out="${src%.tl}.lua"
    cp "$src" "$out" || exit 1
    echo "Wrote: $out"
    ;;
  run)
    echo "LUA_PATH=$LUA_PATH"
    ;;
  build)
    echo "build: nothing to do"
    ;;
esac
"#;

/// Write the stand-in into `dir` and return its path
pub fn write_stand_in(dir: &Path) -> PathBuf {
    let path = dir.join("tl");
    fs::write(&path, STAND_IN).unwrap();
    path
}

/// Configuration running the stand-in through `sh`, with fixtures under `dir`
pub fn stand_in_config(dir: &Path) -> HarnessConfig {
    HarnessConfig {
        interpreter: "sh".to_string(),
        executable: write_stand_in(dir),
        temp_root: dir.to_path_buf(),
        ..HarnessConfig::default()
    }
}
