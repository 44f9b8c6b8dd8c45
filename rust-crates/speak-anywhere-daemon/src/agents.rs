//! CLI agent detection under terminal windows
//!
//! Given a terminal's window PID, walks its descendants through
//! `/proc/<pid>/task/*/children` looking for a process whose comm contains a
//! configured agent name, and reads that process's working directory. The
//! first match in depth-first order wins. Unreadable proc entries are
//! skipped; processes come and go while we walk.

use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentMatch {
    pub agent: String,
    pub working_dir: String,
}

pub struct AgentDetector {
    known_agents: Vec<String>,
}

impl AgentDetector {
    pub fn new(known_agents: Vec<String>) -> Self {
        Self { known_agents }
    }

    /// Find a known agent underneath `pid`, or `None`.
    pub fn detect(&self, pid: i32) -> Option<AgentMatch> {
        if pid <= 0 {
            return None;
        }
        self.search_tree(pid)
    }

    fn search_tree(&self, pid: i32) -> Option<AgentMatch> {
        for child in children_of(pid) {
            let comm = read_comm(child);
            if comm.is_empty() {
                continue;
            }

            if let Some(agent) = self.match_agent(&comm) {
                return Some(AgentMatch {
                    agent: agent.to_string(),
                    working_dir: read_cwd(child),
                });
            }

            // Recurse through shells and other intermediaries.
            if let Some(found) = self.search_tree(child) {
                return Some(found);
            }
        }
        None
    }

    fn match_agent(&self, comm: &str) -> Option<&str> {
        self.known_agents
            .iter()
            .find(|agent| comm.contains(agent.as_str()))
            .map(String::as_str)
    }
}

fn children_of(pid: i32) -> Vec<i32> {
    let task_dir = format!("/proc/{pid}/task");
    let mut children = Vec::new();

    let Ok(entries) = fs::read_dir(Path::new(&task_dir)) else {
        return children;
    };

    for entry in entries.flatten() {
        let Ok(list) = fs::read_to_string(entry.path().join("children")) else {
            continue;
        };
        children.extend(list.split_whitespace().filter_map(|p| p.parse::<i32>().ok()));
    }

    children
}

fn read_comm(pid: i32) -> String {
    fs::read_to_string(format!("/proc/{pid}/comm"))
        .map(|s| s.trim_end().to_string())
        .unwrap_or_default()
}

fn read_cwd(pid: i32) -> String {
    fs::read_link(format!("/proc/{pid}/cwd"))
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> AgentDetector {
        AgentDetector::new(vec!["claude".into(), "aider".into(), "gh".into()])
    }

    #[test]
    fn test_invalid_pid_is_empty() {
        assert_eq!(detector().detect(0), None);
        assert_eq!(detector().detect(-5), None);
    }

    #[test]
    fn test_comm_substring_match() {
        let d = detector();
        assert_eq!(d.match_agent("claude"), Some("claude"));
        assert_eq!(d.match_agent("claude-code"), Some("claude"));
        assert_eq!(d.match_agent("bash"), None);
        // Substring semantics, as configured names are short.
        assert_eq!(d.match_agent("ghostty"), Some("gh"));
    }

    #[test]
    fn test_nonexistent_pid_has_no_children() {
        // PID 0 never has a /proc entry; i32::MAX practically never does.
        assert!(children_of(i32::MAX).is_empty());
        assert_eq!(read_comm(i32::MAX), "");
        assert_eq!(read_cwd(i32::MAX), "");
    }
}
