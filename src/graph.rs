//! Job dependency ordering via `needs` declarations.
//!
//! Builds the dependency graph over a workflow's jobs, rejects unknown
//! references and cycles, and answers which jobs are ready to start given
//! the set of finished jobs.

use anyhow::{anyhow, bail, Result};
use std::collections::{HashMap, HashSet};

use crate::workflow::Workflow;

/// Dependency graph over job ids, in workflow declaration order.
#[derive(Debug, Clone)]
pub struct JobGraph {
    /// Job ids in declaration order.
    pub order: Vec<String>,
    /// Job id -> ids it needs.
    pub needs: HashMap<String, Vec<String>>,
}

impl JobGraph {
    /// Build and validate the graph for a workflow.
    ///
    /// Fails on `needs` entries naming unknown jobs and on cycles, naming
    /// the offending job in both cases.
    pub fn build(workflow: &Workflow) -> Result<Self> {
        let order: Vec<String> = workflow.jobs.iter().map(|(id, _)| id.clone()).collect();
        let known: HashSet<&String> = order.iter().collect();

        let mut needs = HashMap::new();
        for (job_id, job) in &workflow.jobs {
            let deps = job.needs_list();
            for dep in &deps {
                if !known.contains(dep) {
                    bail!(
                        "Job '{}' needs unknown job '{}'",
                        job_id,
                        dep
                    );
                }
            }
            needs.insert(job_id.clone(), deps);
        }

        let graph = JobGraph { order, needs };
        graph.check_cycles()?;
        Ok(graph)
    }

    /// Depth-first cycle check over the `needs` edges, with a visited set
    /// per path so each job is reported at most once.
    fn check_cycles(&self) -> Result<()> {
        let mut done = HashSet::new();
        for job_id in &self.order {
            let mut path = HashSet::new();
            self.visit(job_id, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        job_id: &str,
        path: &mut HashSet<String>,
        done: &mut HashSet<String>,
    ) -> Result<()> {
        if done.contains(job_id) {
            return Ok(());
        }
        if path.contains(job_id) {
            bail!("Circular dependency detected involving job '{}'", job_id);
        }
        path.insert(job_id.to_string());
        if let Some(deps) = self.needs.get(job_id) {
            for dep in deps {
                self.visit(dep, path, done)?;
            }
        }
        path.remove(job_id);
        done.insert(job_id.to_string());
        Ok(())
    }

    /// Deterministic topological order: repeatedly take the first job in
    /// declaration order whose needs are all placed.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut placed: Vec<String> = Vec::with_capacity(self.order.len());
        let mut placed_set: HashSet<String> = HashSet::new();

        while placed.len() < self.order.len() {
            let next = self
                .order
                .iter()
                .find(|id| !placed_set.contains(*id) && self.is_ready(id, &placed_set))
                .ok_or_else(|| anyhow!("Dependency graph has no runnable job left"))?;
            placed_set.insert(next.clone());
            placed.push(next.clone());
        }
        Ok(placed)
    }

    /// Jobs not yet finished whose needs have all finished, in declaration
    /// order.
    pub fn ready_jobs(&self, finished: &HashSet<String>) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| !finished.contains(*id) && self.is_ready(id, finished))
            .cloned()
            .collect()
    }

    fn is_ready(&self, job_id: &str, finished: &HashSet<String>) -> bool {
        self.needs
            .get(job_id)
            .map(|deps| deps.iter().all(|d| finished.contains(d)))
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Workflow;

    fn graph_of(jobs_yaml: &str) -> Result<JobGraph> {
        let wf = Workflow::parse(&format!("on: push\njobs:\n{}", jobs_yaml))?;
        JobGraph::build(&wf)
    }

    #[test]
    fn test_needs_ordering() {
        let graph = graph_of(
            "  integration-testing:\n    needs: unit-testing\n    steps: []\n  unit-testing:\n    steps: []\n",
        )
        .unwrap();
        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec!["unit-testing", "integration-testing"]);
    }

    #[test]
    fn test_declaration_order_kept_for_independent_jobs() {
        let graph =
            graph_of("  lint:\n    steps: []\n  test:\n    steps: []\n  build:\n    steps: []\n")
                .unwrap();
        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec!["lint", "test", "build"]);
    }

    #[test]
    fn test_unknown_needs_rejected() {
        let result = graph_of("  a:\n    needs: missing\n    steps: []\n");
        assert!(result.is_err());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("unknown job 'missing'"));
    }

    #[test]
    fn test_cycle_rejected() {
        let result = graph_of(
            "  a:\n    needs: b\n    steps: []\n  b:\n    needs: a\n    steps: []\n",
        );
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Circular dependency"));
    }

    #[test]
    fn test_self_cycle_rejected() {
        let result = graph_of("  a:\n    needs: a\n    steps: []\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_ready_jobs() {
        let graph = graph_of(
            "  build:\n    steps: []\n  test:\n    needs: build\n    steps: []\n  deploy:\n    needs: [build, test]\n    steps: []\n",
        )
        .unwrap();

        let mut finished = HashSet::new();
        assert_eq!(graph.ready_jobs(&finished), vec!["build"]);

        finished.insert("build".to_string());
        assert_eq!(graph.ready_jobs(&finished), vec!["test"]);

        finished.insert("test".to_string());
        assert_eq!(graph.ready_jobs(&finished), vec!["deploy"]);
    }

    #[test]
    fn test_diamond() {
        let graph = graph_of(
            "  a:\n    steps: []\n  b:\n    needs: a\n    steps: []\n  c:\n    needs: a\n    steps: []\n  d:\n    needs: [b, c]\n    steps: []\n",
        )
        .unwrap();
        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }
}
