//! Run orchestration.
//!
//! A run walks the job graph in dependency waves: every job whose needs
//! have finished starts in the current wave, one instance per matrix
//! combination. Instances execute on a bounded worker pool; `max-parallel`
//! on a strategy additionally caps how many legs of that job run at once.
//! The run record is persisted after every instance transition so `status`
//! always sees a consistent view.

use anyhow::{anyhow, bail, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::concurrency;
use crate::config::Config;
use crate::expr::EvalContext;
use crate::graph::JobGraph;
use crate::matrix::{self, Combination};
use crate::paths;
use crate::runner::{self, CancelToken, InstanceTask, RunEnv};
use crate::runs::{Conclusion, RunRecord, Status};
use crate::trigger::Event;
use crate::ui;
use crate::utc_now_iso;
use crate::workflow::{Job, Workflow};

/// One instance in a run plan.
#[derive(Debug, Clone)]
pub struct PlannedInstance {
    pub name: String,
    pub combo: Combination,
}

/// One job in a run plan, with its expanded instances.
#[derive(Debug, Clone)]
pub struct PlannedJob {
    pub job_id: String,
    pub needs: Vec<String>,
    pub instances: Vec<PlannedInstance>,
}

/// Compute the execution plan without running anything: jobs in
/// topological order, each with its expanded matrix instances.
pub fn plan(workflow: &Workflow, job_filter: Option<&str>) -> Result<Vec<PlannedJob>> {
    let graph = JobGraph::build(workflow)?;
    let order = selected_order(&graph, job_filter)?;

    let mut planned = Vec::with_capacity(order.len());
    for job_id in &order {
        let job = workflow
            .job(job_id)
            .ok_or_else(|| anyhow!("Job '{}' not found in workflow", job_id))?;
        let combos = expand_job(job)?;
        let instances = combos
            .into_iter()
            .map(|combo| PlannedInstance {
                name: instance_name(job_id, job, &combo),
                combo,
            })
            .collect();
        planned.push(PlannedJob {
            job_id: job_id.clone(),
            needs: job.needs_list(),
            instances,
        });
    }
    Ok(planned)
}

/// Options for executing a run.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub run_id: String,
    pub event: Event,
    /// Restrict the run to one job and its transitive needs.
    pub job_filter: Option<String>,
}

/// Execute a workflow run to completion and return the final record.
///
/// The caller has already decided the workflow is triggered by the event.
/// Acquires the workflow's concurrency group first; a busy group without
/// cancel-in-progress is an error and no record is written.
pub fn execute(
    workflow: &Workflow,
    config: &Config,
    root: &Path,
    opts: &ExecuteOptions,
    cancel: &CancelToken,
) -> Result<RunRecord> {
    let graph = JobGraph::build(workflow)?;
    let order = selected_order(&graph, opts.job_filter.as_deref())?;
    let selected: HashSet<String> = order.iter().cloned().collect();

    let runs_dir = root.join(paths::RUNS_DIR);
    let locks_dir = root.join(paths::LOCKS_DIR);
    let event_name = opts.event.kind.to_string();

    // Group keys may interpolate event and env context.
    let mut group_env = config.env.clone();
    group_env.extend(workflow.env.clone());
    let group_ctx = EvalContext {
        env: group_env,
        event_name: event_name.clone(),
        event_ref: opts.event.git_ref.clone(),
        workspace: root.to_path_buf(),
        ..Default::default()
    };
    let group = concurrency::group_key(workflow, &opts.event, &group_ctx)?;
    let cancel_in_progress = workflow
        .concurrency
        .as_ref()
        .map(|c| c.cancel_in_progress)
        .unwrap_or(false);
    let guard = concurrency::acquire(
        &locks_dir,
        &runs_dir,
        &group,
        &opts.run_id,
        cancel_in_progress,
    )?;

    let mut run = RunRecord::new(
        &opts.run_id,
        &workflow.display_name(),
        &event_name,
        &opts.event.git_ref,
    );
    run.workflow_file = workflow.path.as_ref().map(|p| p.display().to_string());
    run.concurrency_group = Some(group);
    run.status = Status::InProgress;

    // Pre-populate every instance record so the full shape of the run is
    // visible from the first save.
    let mut index_map: HashMap<String, Vec<usize>> = HashMap::new();
    let mut combos_map: HashMap<String, Vec<Combination>> = HashMap::new();
    for job_id in &order {
        let job = workflow
            .job(job_id)
            .ok_or_else(|| anyhow!("Job '{}' not found in workflow", job_id))?;
        let combos = expand_job(job)?;
        let mut indices = Vec::with_capacity(combos.len());
        for combo in &combos {
            let name = instance_name(job_id, job, combo);
            indices.push(run.jobs.len());
            run.jobs.push(runner::instance_record(job_id, &name, combo, job));
        }
        index_map.insert(job_id.clone(), indices);
        combos_map.insert(job_id.clone(), combos);
    }
    run.save(&runs_dir)?;

    let env = RunEnv {
        run_id: opts.run_id.clone(),
        workspace: root.to_path_buf(),
        logs_dir: root.join(paths::LOGS_DIR),
        cache_dir: resolve_cache_dir(config, root),
        default_shell: config.defaults.shell.clone(),
        event_name,
        event_ref: opts.event.git_ref.clone(),
        base_env: config.env.clone(),
        workflow_env: workflow.env.clone(),
    };

    let shared = Mutex::new(run);
    let mut finished: HashSet<String> = HashSet::new();
    let mut job_results: HashMap<String, Conclusion> = HashMap::new();

    while finished.len() < order.len() {
        if cancel.is_cancelled() {
            cancel_remaining(&shared, &order, &finished, &index_map, &mut job_results)?;
            let mut run = lock(&shared)?;
            run.save(&runs_dir)?;
            break;
        }

        let ready: Vec<String> = graph
            .ready_jobs(&finished)
            .into_iter()
            .filter(|id| selected.contains(id))
            .collect();
        if ready.is_empty() {
            bail!("Dependency graph has no runnable job left");
        }

        run_wave(
            workflow,
            config,
            &graph,
            &ready,
            &index_map,
            &combos_map,
            &shared,
            &runs_dir,
            &env,
            cancel,
            &mut job_results,
        )?;
        finished.extend(ready);
    }

    let mut run = lock(&shared).map(|g| g.clone())?;

    let mut conclusion = Conclusion::Skipped;
    for job_id in &order {
        let result = job_results
            .get(job_id)
            .copied()
            .unwrap_or(Conclusion::Cancelled);
        let tolerated = workflow
            .job(job_id)
            .map(|j| j.continue_on_error)
            .unwrap_or(false);
        let contribution = if tolerated && result == Conclusion::Failure {
            Conclusion::Success
        } else {
            result
        };
        conclusion = conclusion.worst(contribution);
    }

    run.complete(conclusion);
    run.save(&runs_dir)?;
    crate::runs::clear_cancel(&runs_dir, &opts.run_id)?;
    guard.release();
    Ok(run)
}

fn resolve_cache_dir(config: &Config, root: &Path) -> PathBuf {
    let dir = config.cache_dir();
    if dir.is_absolute() {
        dir
    } else {
        root.join(dir)
    }
}

fn expand_job(job: &Job) -> Result<Vec<Combination>> {
    matrix::expand_or_single(job.strategy.as_ref().and_then(|s| s.matrix.as_ref()))
}

fn instance_name(job_id: &str, job: &Job, combo: &Combination) -> String {
    let base = job.name.clone().unwrap_or_else(|| job_id.to_string());
    if combo.is_empty() {
        base
    } else {
        format!("{} {}", base, matrix::label(combo))
    }
}

/// Topological order, optionally restricted to one job plus everything it
/// transitively needs.
fn selected_order(graph: &JobGraph, job_filter: Option<&str>) -> Result<Vec<String>> {
    let order = graph.topological_order()?;
    let Some(target) = job_filter else {
        return Ok(order);
    };
    if !graph.order.iter().any(|id| id == target) {
        bail!("Job '{}' not found in workflow", target);
    }

    let mut wanted: HashSet<String> = HashSet::new();
    let mut stack = vec![target.to_string()];
    while let Some(id) = stack.pop() {
        if !wanted.insert(id.clone()) {
            continue;
        }
        if let Some(deps) = graph.needs.get(&id) {
            stack.extend(deps.iter().cloned());
        }
    }
    Ok(order.into_iter().filter(|id| wanted.contains(id)).collect())
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("A worker thread panicked"))
}

/// Mark every instance of every unfinished job cancelled.
fn cancel_remaining(
    shared: &Mutex<RunRecord>,
    order: &[String],
    finished: &HashSet<String>,
    index_map: &HashMap<String, Vec<usize>>,
    job_results: &mut HashMap<String, Conclusion>,
) -> Result<()> {
    let mut run = lock(shared)?;
    for job_id in order {
        if finished.contains(job_id) {
            continue;
        }
        if let Some(indices) = index_map.get(job_id) {
            for &idx in indices {
                let record = &mut run.jobs[idx];
                record.status = Status::Completed;
                record.conclusion = Some(Conclusion::Cancelled);
                for step in &mut record.steps {
                    step.status = Status::Completed;
                    step.conclusion = Some(Conclusion::Cancelled);
                }
            }
        }
        job_results.insert(job_id.clone(), Conclusion::Cancelled);
    }
    Ok(())
}

struct WaveTask {
    record_index: usize,
    name: String,
    task: InstanceTask,
    /// Fail-fast flag shared by the legs of one matrix job.
    fail_flag: Option<Arc<AtomicBool>>,
    /// Per-job cap from `strategy.max-parallel`.
    cap: Option<usize>,
}

struct WaveQueue {
    tasks: VecDeque<WaveTask>,
    running: HashMap<String, usize>,
}

#[allow(clippy::too_many_arguments)]
fn run_wave(
    workflow: &Workflow,
    config: &Config,
    graph: &JobGraph,
    ready: &[String],
    index_map: &HashMap<String, Vec<usize>>,
    combos_map: &HashMap<String, Vec<Combination>>,
    shared: &Mutex<RunRecord>,
    runs_dir: &Path,
    env: &RunEnv,
    cancel: &CancelToken,
    job_results: &mut HashMap<String, Conclusion>,
) -> Result<()> {
    let mut queue_state = WaveQueue {
        tasks: VecDeque::new(),
        running: HashMap::new(),
    };

    for job_id in ready {
        let job = workflow
            .job(job_id)
            .ok_or_else(|| anyhow!("Job '{}' not found in workflow", job_id))?;
        let indices = index_map
            .get(job_id)
            .ok_or_else(|| anyhow!("Job '{}' has no planned instances", job_id))?;

        if !config.satisfies_labels(&job.runs_on_labels()) {
            if !ui::is_quiet() {
                eprintln!(
                    "{} job '{}' requests runner labels {:?}; this host has {:?}",
                    ui::colors::warning("skipping"),
                    job_id,
                    job.runs_on_labels(),
                    config.runner.labels
                );
            }
            let mut run = lock(shared)?;
            for &idx in indices {
                let record = &mut run.jobs[idx];
                record.status = Status::Completed;
                record.conclusion = Some(Conclusion::Skipped);
                for step in &mut record.steps {
                    step.status = Status::Completed;
                    step.conclusion = Some(Conclusion::Skipped);
                }
            }
            run.save(runs_dir)?;
            continue;
        }

        let needs_results: BTreeMap<String, String> = graph
            .needs
            .get(job_id)
            .map(|deps| {
                deps.iter()
                    .map(|d| {
                        let result = job_results
                            .get(d)
                            .copied()
                            .unwrap_or(Conclusion::Skipped);
                        (d.clone(), result.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default();

        let strategy = job.strategy.clone().unwrap_or_default();
        let fail_flag = if strategy.fail_fast && indices.len() > 1 {
            Some(Arc::new(AtomicBool::new(false)))
        } else {
            None
        };

        let combos = combos_map
            .get(job_id)
            .ok_or_else(|| anyhow!("Job '{}' has no expanded matrix", job_id))?;
        let run = lock(shared)?;
        for (combo, &idx) in combos.iter().zip(indices.iter()) {
            queue_state.tasks.push_back(WaveTask {
                record_index: idx,
                name: run.jobs[idx].name.clone(),
                task: InstanceTask {
                    job_id: job_id.clone(),
                    job: job.clone(),
                    combo: combo.clone(),
                    needs_results: needs_results.clone(),
                },
                fail_flag: fail_flag.clone(),
                // A cap of zero could never be satisfied and would park
                // every worker on the condvar.
                cap: strategy.max_parallel.map(|cap| cap.max(1)),
            });
        }
    }

    if !queue_state.tasks.is_empty() {
        let workers = config
            .defaults
            .max_parallel
            .max(1)
            .min(queue_state.tasks.len());
        let queue = Mutex::new(queue_state);
        let cvar = Condvar::new();

        let results: Vec<Result<()>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| s.spawn(|| worker(&queue, &cvar, shared, runs_dir, env, cancel)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(anyhow!("A worker thread panicked")))
                })
                .collect()
        });
        for result in results {
            result?;
        }
    }

    // Aggregate instance conclusions into per-job results for gating.
    let run = lock(shared)?;
    for job_id in ready {
        if let Some(indices) = index_map.get(job_id) {
            let mut aggregate = Conclusion::Skipped;
            for &idx in indices {
                aggregate = aggregate.worst(run.jobs[idx].effective_conclusion());
            }
            job_results.insert(job_id.clone(), aggregate);
        }
    }
    Ok(())
}

fn worker(
    queue: &Mutex<WaveQueue>,
    cvar: &Condvar,
    shared: &Mutex<RunRecord>,
    runs_dir: &Path,
    env: &RunEnv,
    cancel: &CancelToken,
) -> Result<()> {
    loop {
        let task = {
            let mut state = lock(queue)?;
            loop {
                if state.tasks.is_empty() {
                    return Ok(());
                }
                let pos = state.tasks.iter().position(|t| match t.cap {
                    Some(cap) => {
                        state.running.get(&t.task.job_id).copied().unwrap_or(0) < cap
                    }
                    None => true,
                });
                match pos {
                    Some(pos) => {
                        let task = state
                            .tasks
                            .remove(pos)
                            .ok_or_else(|| anyhow!("Wave queue index out of range"))?;
                        *state.running.entry(task.task.job_id.clone()).or_insert(0) += 1;
                        break task;
                    }
                    None => {
                        state = cvar
                            .wait(state)
                            .map_err(|_| anyhow!("A worker thread panicked"))?;
                    }
                }
            }
        };

        let mut record = {
            let mut run = lock(shared)?;
            run.jobs[task.record_index].status = Status::InProgress;
            run.save(runs_dir)?;
            run.jobs[task.record_index].clone()
        };

        let conclusion = match runner::run_instance(
            env,
            &task.task,
            &mut record,
            cancel,
            task.fail_flag.as_ref(),
        ) {
            Ok(conclusion) => conclusion,
            Err(err) => {
                if !ui::is_quiet() {
                    eprintln!("{} {}: {:#}", ui::colors::error("error"), task.name, err);
                }
                record.status = Status::Completed;
                record.conclusion = Some(Conclusion::Failure);
                record.completed_at = Some(utc_now_iso());
                Conclusion::Failure
            }
        };

        if conclusion == Conclusion::Failure {
            if let Some(flag) = &task.fail_flag {
                flag.store(true, Ordering::SeqCst);
            }
        }

        {
            let mut run = lock(shared)?;
            run.jobs[task.record_index] = record;
            run.save(runs_dir)?;
        }

        if !ui::is_quiet() {
            println!(
                "{} {}",
                ui::state_icon(Status::Completed, Some(conclusion)),
                task.name
            );
        }

        let mut state = lock(queue)?;
        if let Some(count) = state.running.get_mut(&task.task.job_id) {
            *count = count.saturating_sub(1);
        }
        cvar.notify_all();
    }
}
