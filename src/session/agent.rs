//! Agent fingerprinting.
//!
//! A fingerprint identifies the calling agent so repeated invocations from
//! the same agent share a session. Detection order:
//!
//! 1. `TD_SESSION_ID` (explicit override)
//! 2. Known agent environment variables
//! 3. Process ancestry (at most 15 hops, memoized per process)
//! 4. Terminal environment variables
//! 5. `unknown`

use std::collections::HashMap;
use std::fmt;
use std::process::Command;
use std::sync::OnceLock;
use tracing::trace;

pub const EXPLICIT_ENV: &str = "TD_SESSION_ID";
pub const MAX_ANCESTRY_HOPS: usize = 15;
const SANITIZED_MAX_LEN: usize = 32;

/// Environment variables that name a specific agent.
const AGENT_ENV_VARS: &[(&str, &str)] = &[
    ("CURSOR_AGENT", "cursor"),
    ("CLAUDE_CODE_SSE_PORT", "claude-code"),
];

/// Process-name substrings checked against each ancestor, first hit wins.
const ANCESTRY_TABLE: &[(&str, &str)] = &[
    ("claude", "claude-code"),
    ("cursor", "cursor"),
    ("codex", "codex"),
    ("windsurf", "windsurf"),
    ("zed", "zed"),
    ("aider", "aider"),
    ("copilot", "copilot"),
    ("gemini", "gemini"),
];

const TERMINAL_ENV_VARS: &[&str] = &[
    "TERM_SESSION_ID",
    "TMUX_PANE",
    "STY",
    "WINDOWID",
    "KONSOLE_DBUS_SESSION",
    "GNOME_TERMINAL_SCREEN",
];

const LEGACY_CONTEXT_VARS: &[&str] = &[
    "CLAUDE_SESSION_ID",
    "ANTHROPIC_SESSION_ID",
    "AI_SESSION_ID",
    "CURSOR_SESSION_ID",
    "COPILOT_SESSION_ID",
    "TERM_SESSION_ID",
    "TMUX_PANE",
    "STY",
    "WINDOWID",
    "SSH_TTY",
];

/// A frozen view of environment variables.
///
/// Detection reads through this instead of `std::env` so callers and tests
/// can supply their own values.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `name` when set and non-blank.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) {
        self.vars.remove(name);
    }
}

/// Who is calling, as far as we can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentFingerprint {
    pub agent_type: String,
    pub pid: u32,
    explicit_id: Option<String>,
}

impl AgentFingerprint {
    #[must_use]
    pub fn new(agent_type: impl Into<String>, pid: u32) -> Self {
        Self {
            agent_type: agent_type.into(),
            pid,
            explicit_id: None,
        }
    }

    #[must_use]
    pub fn explicit(id: &str) -> Self {
        Self {
            agent_type: "explicit".to_string(),
            pid: 0,
            explicit_id: Some(sanitize(id)),
        }
    }

    #[must_use]
    pub fn unknown() -> Self {
        Self::new("unknown", 0)
    }

    #[must_use]
    pub const fn is_explicit(&self) -> bool {
        self.explicit_id.is_some()
    }
}

impl fmt::Display for AgentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.explicit_id {
            Some(id) => write!(f, "explicit_{id}"),
            None if self.pid > 0 => write!(f, "{}_{}", self.agent_type, self.pid),
            None => f.write_str(&self.agent_type),
        }
    }
}

/// Keep `[A-Za-z0-9_-]`, replace anything else with `_`, cap at 32 chars.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(SANITIZED_MAX_LEN)
        .collect()
}

/// Fingerprint the current process.
#[must_use]
pub fn detect(env: &EnvSnapshot) -> AgentFingerprint {
    detect_with(env, parent_pid(), cached_ancestry)
}

/// Fingerprint with injected parent pid and ancestry lookup.
///
/// `ancestry` is only consulted when the environment does not decide.
pub fn detect_with<F>(env: &EnvSnapshot, parent_pid: u32, ancestry: F) -> AgentFingerprint
where
    F: FnOnce() -> Option<(String, u32)>,
{
    if let Some(id) = env.get(EXPLICIT_ENV) {
        return AgentFingerprint::explicit(id.trim());
    }

    for (var, agent_type) in AGENT_ENV_VARS {
        if env.get(var).is_some() {
            return AgentFingerprint::new(*agent_type, parent_pid);
        }
    }

    if let Some((agent_type, pid)) = ancestry() {
        return AgentFingerprint::new(agent_type, pid);
    }

    if TERMINAL_ENV_VARS.iter().any(|var| env.get(var).is_some()) {
        return AgentFingerprint::new("terminal", parent_pid);
    }

    AgentFingerprint::unknown()
}

/// Context id used by the single-file session format.
#[must_use]
pub fn legacy_context_id(env: &EnvSnapshot, parent_pid: u32) -> String {
    LEGACY_CONTEXT_VARS
        .iter()
        .find_map(|var| env.get(var))
        .map_or_else(
            || format!("ppid-{parent_pid}-{}", env.get("SHLVL").unwrap_or("")),
            str::to_string,
        )
}

/// Our parent's pid, or 0 where the platform does not expose it.
#[must_use]
pub fn parent_pid() -> u32 {
    #[cfg(unix)]
    {
        std::os::unix::process::parent_id()
    }
    #[cfg(not(unix))]
    {
        0
    }
}

/// One step of the process tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub ppid: u32,
    pub name: String,
}

/// Walk up from `start` looking for a known agent process.
///
/// Stops after [`MAX_ANCESTRY_HOPS`] ancestors, at init, or when `lookup`
/// cannot resolve a pid.
pub fn walk_ancestry<F>(start: u32, lookup: F) -> Option<(String, u32)>
where
    F: Fn(u32) -> Option<ProcessInfo>,
{
    let mut pid = start;
    for _ in 0..MAX_ANCESTRY_HOPS {
        if pid <= 1 {
            return None;
        }
        let info = lookup(pid)?;
        let name = info.name.to_lowercase();
        trace!(pid, name = %name, "inspecting ancestor");
        if let Some((_, agent_type)) = ANCESTRY_TABLE
            .iter()
            .find(|(needle, _)| name.contains(needle))
        {
            return Some(((*agent_type).to_string(), pid));
        }
        if info.ppid == pid {
            return None;
        }
        pid = info.ppid;
    }
    None
}

fn cached_ancestry() -> Option<(String, u32)> {
    static ANCESTRY: OnceLock<Option<(String, u32)>> = OnceLock::new();
    ANCESTRY
        .get_or_init(|| walk_ancestry(parent_pid(), process_info))
        .clone()
}

/// Look up a process, preferring `/proc` and falling back to `ps`.
#[must_use]
pub fn process_info(pid: u32) -> Option<ProcessInfo> {
    proc_fs_info(pid).or_else(|| ps_info(pid))
}

fn proc_fs_info(pid: u32) -> Option<ProcessInfo> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let mut info = parse_proc_stat(&stat)?;
    // comm is truncated to 15 bytes; argv[0] helps with interpreters like node.
    if let Ok(cmdline) = std::fs::read(format!("/proc/{pid}/cmdline")) {
        let argv: Vec<String> = cmdline
            .split(|b| *b == 0)
            .take(2)
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect();
        if !argv.is_empty() {
            info.name = format!("{} {}", info.name, argv.join(" "));
        }
    }
    Some(info)
}

/// Parse `/proc/<pid>/stat`: `pid (comm) state ppid ...`.
#[must_use]
pub fn parse_proc_stat(stat: &str) -> Option<ProcessInfo> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    let name = stat.get(open + 1..close)?.to_string();
    let mut rest = stat.get(close + 1..)?.split_whitespace();
    let _state = rest.next()?;
    let ppid = rest.next()?.parse().ok()?;
    Some(ProcessInfo { ppid, name })
}

fn ps_info(pid: u32) -> Option<ProcessInfo> {
    let output = Command::new("ps")
        .args(["-o", "ppid=,comm=", "-p", &pid.to_string()])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_ps_line(&String::from_utf8_lossy(&output.stdout))
}

/// Parse one `ps -o ppid=,comm=` line.
#[must_use]
pub fn parse_ps_line(line: &str) -> Option<ProcessInfo> {
    let line = line.trim();
    let split = line.find(char::is_whitespace)?;
    let ppid = line[..split].parse().ok()?;
    let name = line[split..].trim().to_string();
    Some(ProcessInfo { ppid, name })
}
