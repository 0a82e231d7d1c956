use std::path::{Path, PathBuf};

use entities::{GUARDIAN_PROCESS_NAME, MAIN_PROCESS_NAME};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// One entry of the process table.
#[derive(Debug, Clone, Default)]
pub struct ProcessRecord {
  pub pid: u32,
  pub name: String,
  pub exe: Option<PathBuf>,
  pub cmdline: Vec<String>,
}

/// OS process enumeration primitive the supervisor polls. Pluggable so
/// the loop logic can run against a fake table in tests.
pub trait ProcessDirectory {
  fn processes(&mut self) -> Vec<ProcessRecord>;
  /// Forcibly terminates the process. Returns whether the signal was
  /// issued; a process that is already gone is not an error.
  fn terminate(&mut self, pid: u32) -> bool;
}

#[derive(Debug)]
pub struct SysinfoDirectory {
  system: System,
}

impl Default for SysinfoDirectory {
  fn default() -> Self {
    Self::new()
  }
}

impl SysinfoDirectory {
  pub fn new() -> SysinfoDirectory {
    SysinfoDirectory {
      system: System::new(),
    }
  }
}

impl ProcessDirectory for SysinfoDirectory {
  fn processes(&mut self) -> Vec<ProcessRecord> {
    self
      .system
      .refresh_processes(ProcessesToUpdate::All, true);
    self
      .system
      .processes()
      .iter()
      .map(|(pid, process)| ProcessRecord {
        pid: pid.as_u32(),
        name: process.name().to_string_lossy().to_string(),
        exe: process.exe().map(Path::to_path_buf),
        cmdline: process
          .cmd()
          .iter()
          .map(|part| part.to_string_lossy().into_owned())
          .collect(),
      })
      .filter(|record| !record.name.is_empty())
      .collect()
  }

  fn terminate(&mut self, pid: u32) -> bool {
    self
      .system
      .process(Pid::from_u32(pid))
      .map(|process| process.kill())
      .unwrap_or(false)
  }
}

/// Whether the record is the main application process, matched by
/// executable base name.
pub fn is_main_process(record: &ProcessRecord) -> bool {
  matches_exe_name(record, MAIN_PROCESS_NAME)
}

/// Whether the record is another guardian instance. Excludes our own
/// pid and any process sharing our executable path (presumed to be
/// ourselves), then matches the guardian marker in the process name or
/// command line - avoiding false positives on unrelated processes.
pub fn is_guardian_instance(
  record: &ProcessRecord,
  self_pid: u32,
  self_exe: Option<&Path>,
) -> bool {
  if record.pid == self_pid {
    return false;
  }
  if let (Some(self_exe), Some(exe)) = (self_exe, record.exe.as_deref())
    && exe == self_exe
  {
    return false;
  }
  if record.name.to_lowercase().contains(GUARDIAN_PROCESS_NAME) {
    return true;
  }
  record
    .cmdline
    .iter()
    .any(|arg| arg.to_lowercase().contains(GUARDIAN_PROCESS_NAME))
}

/// Whether the record's name is on the tool denylist.
pub fn is_denylisted(
  record: &ProcessRecord,
  denylist: &[String],
) -> bool {
  denylist
    .iter()
    .any(|tool| tool.eq_ignore_ascii_case(&record.name))
}

fn matches_exe_name(record: &ProcessRecord, base: &str) -> bool {
  if file_stem_matches(&record.name, base) {
    return true;
  }
  record
    .exe
    .as_deref()
    .and_then(Path::file_name)
    .and_then(|name| name.to_str())
    .is_some_and(|name| file_stem_matches(name, base))
}

fn file_stem_matches(name: &str, base: &str) -> bool {
  let stem = name.strip_suffix(".exe").unwrap_or(name);
  stem.eq_ignore_ascii_case(base)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(pid: u32, name: &str, exe: Option<&str>) -> ProcessRecord {
    ProcessRecord {
      pid,
      name: name.to_string(),
      exe: exe.map(PathBuf::from),
      cmdline: Vec::new(),
    }
  }

  #[test]
  fn matches_main_by_name_with_and_without_exe_suffix() {
    assert!(is_main_process(&record(10, "curfew", None)));
    assert!(is_main_process(&record(10, "Curfew.exe", None)));
    assert!(!is_main_process(&record(10, "curfew-guardian", None)));
    assert!(!is_main_process(&record(10, "curfewd", None)));
  }

  #[test]
  fn matches_main_by_executable_path() {
    let mut other = record(10, "some-wrapper", Some("/opt/curfew/curfew"));
    assert!(is_main_process(&other));
    other.exe = Some(PathBuf::from("/usr/bin/unrelated"));
    assert!(!is_main_process(&other));
  }

  #[test]
  fn guardian_dedup_excludes_self_and_same_path() {
    let self_exe = PathBuf::from("/opt/curfew/curfew-guardian");

    let own_pid =
      record(42, "curfew-guardian", Some("/opt/curfew/curfew-guardian"));
    assert!(!is_guardian_instance(&own_pid, 42, Some(&self_exe)));

    let same_path =
      record(43, "curfew-guardian", Some("/opt/curfew/curfew-guardian"));
    assert!(!is_guardian_instance(&same_path, 42, Some(&self_exe)));
  }

  #[test]
  fn guardian_dedup_detects_second_instance() {
    let self_exe = PathBuf::from("/opt/curfew/curfew-guardian");

    let by_name =
      record(43, "curfew-guardian.exe", Some("/tmp/copy/curfew-guardian"));
    assert!(is_guardian_instance(&by_name, 42, Some(&self_exe)));

    let mut by_cmdline = record(44, "python3", Some("/usr/bin/python3"));
    by_cmdline.cmdline =
      vec!["python3".to_string(), "./curfew-guardian.py".to_string()];
    assert!(is_guardian_instance(&by_cmdline, 42, Some(&self_exe)));

    let unrelated = record(45, "bash", Some("/usr/bin/bash"));
    assert!(!is_guardian_instance(&unrelated, 42, Some(&self_exe)));
  }

  #[test]
  fn denylist_matches_name_case_insensitively() {
    let denylist =
      vec!["taskmgr.exe".to_string(), "procexp.exe".to_string()];
    assert!(is_denylisted(&record(1, "Taskmgr.exe", None), &denylist));
    assert!(is_denylisted(&record(2, "procexp.exe", None), &denylist));
    assert!(!is_denylisted(&record(3, "explorer.exe", None), &denylist));
  }
}
