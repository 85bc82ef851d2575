use std::path::PathBuf;
use tempfile::TempDir;

const FAKE_ADB: &str = r#"#!/bin/sh
if [ "$1" = "-s" ]; then
  shift 2
fi
case "$1" in
  version)
    echo "Android Debug Bridge version 1.0.41"
    ;;
  devices)
    printf 'List of devices attached\nemulator-5554\tdevice\n'
    ;;
  shell)
    case "$2" in
      "dumpsys meminfo")
        cat <<'DUMP'
Applications Memory Usage (in Kilobytes):

Total PSS by process:
    512,000K: com.android.chrome (pid 3100 / activities)
    300,000K: com.spotify.music (pid 2001)
     65,000K: com.android.systemui (pid 1200)
     10,000K: com.example.tiny (pid 4100)

Total RAM: 4,194,304K (status moderate)
 Free RAM:   838,861K
 Used RAM: 3,355,443K
 Lost RAM:         0K
DUMP
        ;;
      "dumpsys activity processes")
        cat <<'DUMP'
  PID mappings:
    Proc #0: fore  T/A/TOP  trm: 0 3100:com.android.chrome/u0a120 (top-activity)
    Proc #1: cch   B/ /CE   trm: 0 2001:com.spotify.music/u0a150 (cch-empty)
    Proc #2: cch   B/ /CE   trm: 0 1200:com.android.systemui/u0a10 (cch-empty)
DUMP
        ;;
      "getprop ro.product.model")
        echo "Pixel 7"
        ;;
      "getprop ro.build.version.release")
        echo "14"
        ;;
      "am force-stop com.spotify.music && echo droidmem-stopped:com.spotify.music")
        echo "droidmem-stopped:com.spotify.music"
        ;;
      *)
        echo "/system/bin/sh: $2: inaccessible or not found" >&2
        exit 127
        ;;
    esac
    ;;
  *)
    echo "adb: unknown command $1" >&2
    exit 1
    ;;
esac
"#;

/// Write an executable stand-in for adb that answers like an emulator.
pub fn fake_adb() -> (TempDir, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("adb");
    std::fs::write(&path, FAKE_ADB).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    (dir, path)
}

pub fn droidmem() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("droidmem-cli"));
    cmd.env_remove("DROIDMEM_CONFIG")
        .env_remove("DROIDMEM_ADB")
        .env_remove("RUST_LOG");
    cmd
}
