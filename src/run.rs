//! Run orchestration: calibrate, allocate, spawn one pinned worker per
//! thread, release them together and join.

use std::thread;

use crate::barrier::ReleaseBarrier;
use crate::buffer::{Backing, Sample, SampleBuffer};
use crate::clock::{self, TickRatio};
use crate::config::RunConfig;
use crate::error::Error;
use crate::platform::Platform;
use crate::sampler::Sampler;

/// What one worker reports back after sampling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub index: usize,
    pub core: usize,
    /// `false` when wiring failed and was tolerated.
    pub bound: bool,
}

/// Everything needed to write the results of a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub buffer: SampleBuffer,
    pub ratio: TickRatio,
    /// Nanoseconds per tick measured across the whole sampling phase.
    pub ns_per_tick: f64,
    pub workers: Vec<WorkerOutcome>,
}

/// State shared by reference with every worker for the length of one run.
pub struct RunContext<'a, P: Platform> {
    config: &'a RunConfig,
    platform: &'a P,
    cores: usize,
    quantum_ticks: u64,
    barrier: ReleaseBarrier,
}

impl<'a, P: Platform> RunContext<'a, P> {
    pub fn new(config: &'a RunConfig, platform: &'a P, ratio: TickRatio) -> Self {
        Self {
            config,
            platform,
            cores: platform.core_count().max(1),
            quantum_ticks: ratio.ticks_for_nanos(config.interval_ns),
            barrier: ReleaseBarrier::new(),
        }
    }

    /// Body of worker `index`: wire, optionally go realtime, then sample.
    /// Returns `None` when another worker failed and this one never sampled.
    fn worker(
        &self,
        index: usize,
        partition: &mut [Sample],
    ) -> Result<Option<WorkerOutcome>, Error> {
        let core = index % self.cores;

        let bound = match self.platform.bind_to_core(core) {
            Ok(()) => true,
            Err(e) if self.config.ignore_wire_failures => {
                log::warn!(
                    target: "ftq::worker",
                    "thread {} not wired to core {}: {}; results may be flaky",
                    index, core, e,
                );
                false
            }
            Err(source) => {
                self.barrier.abort();
                self.barrier.arrive();
                return Err(Error::Bind { core, source });
            }
        };

        if self.config.realtime {
            if let Err(e) = self.platform.request_realtime() {
                log::warn!(
                    target: "ftq::worker",
                    "thread {} could not get realtime priority: {}",
                    index, e,
                );
            }
        }

        self.barrier.arrive();
        if !Sampler::new(self.platform, self.quantum_ticks).run(&self.barrier, partition) {
            log::debug!(target: "ftq::worker", "thread {} skipped sampling, run aborted", index);
            return Ok(None);
        }

        Ok(Some(WorkerOutcome { index, core, bound }))
    }

    /// Single-thread runs sample on the calling thread.
    fn run_inline(&self, buffer: &mut SampleBuffer) -> Result<Vec<WorkerOutcome>, Error> {
        let partition = buffer
            .partitions_mut()
            .next()
            .ok_or_else(|| Error::Thread("sample buffer has no partition".into()))?;
        self.barrier.release();
        let outcome = self
            .worker(0, partition)?
            .ok_or_else(|| Error::Thread("run aborted".into()))?;
        Ok(vec![outcome])
    }

    fn run_threaded(&self, buffer: &mut SampleBuffer) -> Result<Vec<WorkerOutcome>, Error> {
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.config.threads);
            let mut spawn_error = None;

            for (index, partition) in buffer.partitions_mut().enumerate() {
                let spawned = thread::Builder::new()
                    .name(format!("ftq-{}", index))
                    .spawn_scoped(scope, move || self.worker(index, partition));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        spawn_error = Some(e);
                        self.barrier.abort();
                        break;
                    }
                }
            }

            // Hold the release until every worker has wired itself, so a
            // failed bind is known before anyone starts sampling. A worker
            // that died before arriving must not hang the run.
            while self.barrier.arrived() < handles.len()
                && !handles.iter().any(|h| h.is_finished())
            {
                thread::yield_now();
            }

            // Released after every spawn attempt so thread creation never
            // falls inside a measurement window. Also released on failure,
            // or the workers already waiting would spin forever.
            self.barrier.release();

            let joined: Vec<_> = handles
                .into_iter()
                .enumerate()
                .map(|(index, handle)| {
                    handle
                        .join()
                        .map_err(|_| Error::Thread(format!("worker {} panicked", index)))
                        .and_then(|outcome| outcome)
                })
                .collect();

            if let Some(e) = spawn_error {
                return Err(Error::Thread(format!("failed to spawn worker: {}", e)));
            }
            let outcomes = joined.into_iter().collect::<Result<Vec<_>, Error>>()?;
            outcomes
                .into_iter()
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| Error::Thread("run aborted".into()))
        })
    }
}

/// Execute one complete run. Any failed worker fails the whole run, so a
/// returned report always holds every partition.
pub fn run<P: Platform>(config: &RunConfig, platform: &P) -> Result<RunReport, Error> {
    if let Some(arg) = &config.argument {
        log::debug!("test argument: {}", arg);
    }

    let ratio = clock::resolve(platform, config.ticks_per_ns);
    let mut buffer = SampleBuffer::allocate(config.samples, config.threads)?;
    if buffer.backing() == Backing::Heap {
        log::warn!("sample buffer is not locked; results may include page-fault artifacts");
    }

    let ctx = RunContext::new(config, platform, ratio);
    log::debug!(
        "{} threads x {} samples, quantum {} ns = {} ticks (effective {} ns)",
        buffer.threads(),
        buffer.samples_per_thread(),
        config.interval_ns,
        ctx.quantum_ticks,
        ratio.nanos_for_ticks(ctx.quantum_ticks)
    );

    let start = platform.read_nanos();
    let tick_start = platform.read_ticks();
    let workers = if config.threads == 1 {
        ctx.run_inline(&mut buffer)?
    } else {
        ctx.run_threaded(&mut buffer)?
    };
    let tick_end = platform.read_ticks();
    let end = platform.read_nanos();

    let elapsed = end.saturating_sub(start);
    let ticks = tick_end.saturating_sub(tick_start);
    log::info!("start {} end {} elapsed {}", start, end, elapsed);
    log::info!("tick start {} tick end {} elapsed {}", tick_start, tick_end, ticks);

    let ns_per_tick = if elapsed > 0 && ticks > 0 {
        let ns_per_tick = elapsed as f64 / ticks as f64;
        log::info!(
            "avg ticks per ns is {}; ns per tick is {}",
            ticks as f64 / elapsed as f64,
            ns_per_tick
        );
        ns_per_tick
    } else {
        log::warn!("degenerate run bracket, converting with the calibrated ratio");
        ratio.ns_per_tick()
    };
    log::info!("pre-computed ticks per ns: {}", ratio.ticks_per_ns());
    log::info!("sample frequency is {}", config.frequency_hz());

    Ok(RunReport {
        buffer,
        ratio,
        ns_per_tick,
        workers,
    })
}
