//! Implementation of the `clusterlock simulate` command.
//!
//! Runs a whole cluster inside the process on an [`InMemoryNetwork`]:
//! 1. Start one lock manager per simulated member
//! 2. Optionally crash a member that holds a lock and check that a waiting
//!    member takes it over
//! 3. Let workers on every surviving member compete for the locks while an
//!    occupancy map records who is inside each lock
//! 4. Print a summary; any overlap of two members is a safety violation

use crate::cli::SimulateArgs;
use clusterlock::config::Config;
use clusterlock::error::{LockError, Result};
use clusterlock::locks::{ClusterLockManager, LockContext, LockRegistry};
use clusterlock::node::ClusterNode;
use clusterlock::transport::{GroupTransport, InMemoryNetwork};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct SimMember {
    node: ClusterNode,
    manager: ClusterLockManager,
}

/// Which member is inside each lock right now.
#[derive(Default)]
struct OccupancyMap {
    inside: Mutex<HashMap<String, (ClusterNode, usize)>>,
    violations: Mutex<Vec<String>>,
}

impl OccupancyMap {
    fn enter(&self, lock: &str, member: &ClusterNode) {
        let mut inside = self.inside.lock();
        match inside.get_mut(lock) {
            // Contexts of the owning member share the lock.
            Some((holder, count)) if holder == member => *count += 1,
            Some((holder, _)) => {
                let violation = format!(
                    "{} entered '{}' while {} was inside",
                    member, lock, holder
                );
                tracing::error!(lock, member = %member, holder = %holder, "overlapping lock ownership");
                self.violations.lock().push(violation);
            }
            None => {
                inside.insert(lock.to_string(), (member.clone(), 1));
            }
        }
    }

    fn exit(&self, lock: &str, member: &ClusterNode) {
        let mut inside = self.inside.lock();
        if let Some((holder, count)) = inside.get_mut(lock)
            && holder == member
        {
            *count -= 1;
            if *count == 0 {
                inside.remove(lock);
            }
        }
    }

    fn violations(&self) -> Vec<String> {
        self.violations.lock().clone()
    }
}

/// Outcome of the contention phase.
struct Report {
    acquisitions: Vec<(ClusterNode, usize)>,
    elapsed: Duration,
    violations: Vec<String>,
}

impl Report {
    fn total(&self) -> usize {
        self.acquisitions.iter().map(|(_, count)| count).sum()
    }
}

/// Execute the `clusterlock simulate` command.
pub fn cmd_simulate(args: SimulateArgs) -> Result<()> {
    validate_args(&args)?;

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    // Every simulated member takes its identity from the network.
    config.node_name = None;
    if let Some(path) = &args.event_log {
        config.event_log = Some(path.clone());
    }

    let network = InMemoryNetwork::new();
    let members = start_members(&network, &config, args.members)?;
    let outcome = run(&network, &members, &config, &args);

    for member in &members {
        member.manager.stop();
    }
    outcome
}

fn validate_args(args: &SimulateArgs) -> Result<()> {
    if args.members == 0 {
        return Err(LockError::InvalidArgument(
            "--members must be at least 1".to_string(),
        ));
    }
    if args.locks == 0 {
        return Err(LockError::InvalidArgument(
            "--locks must be at least 1".to_string(),
        ));
    }
    if args.workers == 0 {
        return Err(LockError::InvalidArgument(
            "--workers must be at least 1".to_string(),
        ));
    }
    if args.crash_holder && args.members < 2 {
        return Err(LockError::InvalidArgument(
            "--crash-holder needs at least 2 members".to_string(),
        ));
    }
    Ok(())
}

fn start_members(
    network: &Arc<InMemoryNetwork>,
    config: &Config,
    count: usize,
) -> Result<Vec<SimMember>> {
    // Join everyone before starting so each manager adopts the full view.
    let transports = (1..=count)
        .map(|i| network.join(format!("node-{}", i).as_str()))
        .collect::<Result<Vec<_>>>()?;

    let mut members = Vec::with_capacity(count);
    for transport in transports {
        let node = transport.local_node();
        let manager =
            ClusterLockManager::new(config.clone(), transport, Arc::new(LockRegistry::new()))?;
        manager.start()?;
        members.push(SimMember { node, manager });
    }
    tracing::info!(members = count, "simulated cluster started");
    Ok(members)
}

fn run(
    network: &Arc<InMemoryNetwork>,
    members: &[SimMember],
    config: &Config,
    args: &SimulateArgs,
) -> Result<()> {
    let survivors = if args.crash_holder {
        crash_failover(network, members, config)?;
        &members[1..]
    } else {
        members
    };

    let report = run_contention(survivors, args)?;

    println!(
        "Simulated {} members ({} workers each) competing for {} lock(s)",
        survivors.len(),
        args.workers,
        args.locks
    );
    for (node, count) in &report.acquisitions {
        println!("  {:<12} {} acquisitions", node.to_string(), count);
    }
    println!(
        "Total: {} acquisitions in {:.2}s",
        report.total(),
        report.elapsed.as_secs_f64()
    );

    if let Some(observer) = survivors.first() {
        let locks = observer.manager.locks();
        if !locks.is_empty() {
            println!();
            println!("Locks known to {}:", observer.node);
            for info in locks {
                println!("  {}", info);
            }
        }
    }

    if !report.violations.is_empty() {
        for violation in &report.violations {
            eprintln!("  {}", violation);
        }
        return Err(LockError::SafetyViolation(format!(
            "{} overlapping acquisitions detected",
            report.violations.len()
        )));
    }

    println!("No overlapping ownership observed.");
    Ok(())
}

/// Crash the first member while it holds a lock the second one waits for.
fn crash_failover(
    network: &Arc<InMemoryNetwork>,
    members: &[SimMember],
    config: &Config,
) -> Result<()> {
    let (victim, survivor) = (&members[0], &members[1]);
    let lock = "lock-0";

    victim.manager.lock(lock, LockContext::new())?;
    println!("{} holds '{}'; crashing it", victim.node, lock);

    let wait = config.method_call_timeout().saturating_mul(2);
    let started = Instant::now();
    let taken = thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            let ctx = LockContext::new();
            survivor
                .manager
                .try_lock(lock, ctx, wait)
                .map(|acquired| acquired.then_some(ctx))
        });
        thread::sleep(Duration::from_millis(50));
        network.crash(&victim.node);
        waiter
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    })?;

    let Some(ctx) = taken else {
        return Err(LockError::Timeout {
            lock: lock.to_string(),
            holder: survivor.manager.holder(lock),
        });
    };
    println!(
        "{} took over '{}' after {:.2}s",
        survivor.node,
        lock,
        started.elapsed().as_secs_f64()
    );
    survivor.manager.unlock(lock, ctx)
}

fn run_contention(members: &[SimMember], args: &SimulateArgs) -> Result<Report> {
    let occupancy = OccupancyMap::default();
    let hold = Duration::from_millis(args.hold_ms);
    let started = Instant::now();

    let results: Vec<(ClusterNode, Result<usize>)> = thread::scope(|scope| {
        let handles: Vec<_> = members
            .iter()
            .flat_map(|member| (0..args.workers).map(move |worker| (member, worker)))
            .map(|(member, worker)| {
                let occupancy = &occupancy;
                let handle = scope.spawn(move || {
                    let ctx = LockContext::new();
                    for i in 0..args.iterations {
                        let lock = format!("lock-{}", (i + worker) % args.locks);
                        member.manager.lock(&lock, ctx)?;
                        occupancy.enter(&lock, &member.node);
                        if !hold.is_zero() {
                            thread::sleep(hold);
                        }
                        occupancy.exit(&lock, &member.node);
                        member.manager.unlock(&lock, ctx)?;
                    }
                    Ok::<_, LockError>(args.iterations)
                });
                (member.node.clone(), handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(node, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                (node, result)
            })
            .collect()
    });

    let mut acquisitions: Vec<(ClusterNode, usize)> = members
        .iter()
        .map(|member| (member.node.clone(), 0))
        .collect();
    for (node, result) in results {
        let count = result?;
        if let Some((_, total)) = acquisitions.iter_mut().find(|(n, _)| *n == node) {
            *total += count;
        }
    }

    Ok(Report {
        acquisitions,
        elapsed: started.elapsed(),
        violations: occupancy.violations(),
    })
}
