// src/backend/deferred.rs
//! Worker-pool backend
//!
//! Requests are queued on a `flume` channel and served by a fixed set of
//! worker threads. [`DeferredBackend::submit_reduce`] returns at once with a
//! [`PendingReduction`]; [`PendingReduction::wait`] is the single blocking
//! point. Independent requests complete in no particular order.

use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error};

use super::memory::InMemoryBackend;
use super::ImageryBackend;
use crate::error::{EngineError, Result};
use crate::geometry::Geometry;
use crate::processing::reducer::RegionStats;
use crate::raster::{Image, Raster};

enum Job {
    Reduce {
        image: Image,
        band: String,
        geometry: Geometry,
        scale: f64,
        reply: Sender<Result<RegionStats>>,
    },
    Materialize {
        image: Image,
        band: String,
        reply: Sender<Result<Raster>>,
    },
}

/// A reduction that has been queued but not necessarily computed.
#[must_use = "a pending reduction does nothing unless waited on"]
pub struct PendingReduction {
    rx: Receiver<Result<RegionStats>>,
}

impl PendingReduction {
    /// Block until the worker replies.
    pub fn wait(self) -> Result<RegionStats> {
        self.rx.recv().map_err(|_| EngineError::BackendUnavailable {
            reason: "worker exited before replying".into(),
        })?
    }
}

pub struct DeferredBackend {
    threads: usize,
    req_tx: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DeferredBackend {
    /// Start `threads` workers; defaults to one per logical CPU.
    pub fn new(threads: Option<usize>) -> Self {
        let threads = threads.unwrap_or_else(num_cpus::get).max(1);
        let (req_tx, req_rx) = flume::unbounded::<Job>();

        let workers = (0..threads)
            .map(|worker_id| {
                let req_rx = req_rx.clone();
                thread::spawn(move || worker_loop(worker_id, req_rx))
            })
            .collect();

        debug!(threads, "started deferred backend");
        Self {
            threads,
            req_tx: Mutex::new(Some(req_tx)),
            workers: Mutex::new(workers),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn is_running(&self) -> bool {
        self.req_tx.lock().is_some()
    }

    fn send(&self, job: Job) -> Result<()> {
        let guard = self.req_tx.lock();
        let tx = guard.as_ref().ok_or_else(|| EngineError::BackendUnavailable {
            reason: "backend has been shut down".into(),
        })?;
        tx.send(job).map_err(|_| EngineError::BackendUnavailable {
            reason: "no workers are accepting requests".into(),
        })
    }

    /// Queue a region reduction without waiting for it.
    pub fn submit_reduce(
        &self,
        image: &Image,
        band: &str,
        geometry: &Geometry,
        scale: f64,
    ) -> Result<PendingReduction> {
        let (reply, rx) = flume::bounded(1);
        self.send(Job::Reduce {
            image: image.clone(),
            band: band.to_string(),
            geometry: geometry.clone(),
            scale,
            reply,
        })?;
        Ok(PendingReduction { rx })
    }

    /// Stop accepting requests and join the workers once the queue drains.
    pub fn shutdown(&self) {
        let Some(tx) = self.req_tx.lock().take() else {
            return;
        };
        drop(tx);

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                error!("deferred backend worker panicked");
            }
        }
        debug!("deferred backend stopped");
    }
}

impl Default for DeferredBackend {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Drop for DeferredBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(worker_id: usize, req_rx: Receiver<Job>) {
    let local = InMemoryBackend;
    for job in req_rx {
        // a send error only means the caller stopped waiting
        match job {
            Job::Reduce {
                image,
                band,
                geometry,
                scale,
                reply,
            } => {
                debug!(worker_id, band = %band, image = image.id(), "reduce");
                let _ = reply.send(local.reduce_region(&image, &band, &geometry, scale));
            }
            Job::Materialize { image, band, reply } => {
                debug!(worker_id, band = %band, image = image.id(), "materialize");
                let _ = reply.send(local.materialize(&image, &band));
            }
        }
    }
}

impl ImageryBackend for DeferredBackend {
    fn materialize(&self, image: &Image, band: &str) -> Result<Raster> {
        let (reply, rx) = flume::bounded(1);
        self.send(Job::Materialize {
            image: image.clone(),
            band: band.to_string(),
            reply,
        })?;
        rx.recv().map_err(|_| EngineError::BackendUnavailable {
            reason: "worker exited before replying".into(),
        })?
    }

    fn reduce_region(
        &self,
        image: &Image,
        band: &str,
        geometry: &Geometry,
        scale: f64,
    ) -> Result<RegionStats> {
        self.submit_reduce(image, band, geometry, scale)?.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{GeoTransform, Grid, Raster};

    fn image() -> Image {
        let grid = Grid::new(3, 3, GeoTransform::new(0.0, 30.0, 10.0, -10.0));
        let data = (0..9).map(f64::from).collect();
        Image::new("s", grid)
            .with_raster("B1", Raster::new(grid, data).unwrap())
            .unwrap()
    }

    #[test]
    fn test_matches_in_memory() {
        let backend = DeferredBackend::new(Some(2));
        let g = Geometry::circle(15.0, 15.0, 100.0).unwrap();
        let img = image();
        let pending: Vec<_> = (0..8)
            .map(|_| backend.submit_reduce(&img, "B1", &g, 10.0).unwrap())
            .collect();
        let expected = InMemoryBackend.reduce_region(&img, "B1", &g, 10.0).unwrap();
        for p in pending {
            assert_eq!(p.wait().unwrap(), expected);
        }
        assert_eq!(expected.mean, Some(4.0));
    }

    #[test]
    fn test_shutdown_reports_unavailable() {
        let backend = DeferredBackend::new(Some(1));
        backend.shutdown();
        assert!(!backend.is_running());
        let g = Geometry::circle(15.0, 15.0, 100.0).unwrap();
        let err = backend.reduce_region(&image(), "B1", &g, 10.0).unwrap_err();
        assert!(matches!(err, EngineError::BackendUnavailable { .. }));
    }

    #[test]
    fn test_errors_travel_back() {
        let backend = DeferredBackend::new(Some(1));
        let err = backend.materialize(&image(), "B9").unwrap_err();
        assert!(matches!(err, EngineError::UnknownBand { .. }));
    }
}
