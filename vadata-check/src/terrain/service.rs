//! Service d'altitudes avec cache et file de requêtes
//!
//! Les points déjà connus sont servis depuis le cache, indexé par
//! `(epsg, round(x, 2), round(y, 2))`. Les autres sont découpés en lots et
//! placés dans une file FIFO vidée par au plus `max_concurrent` tâches ; chaque
//! tâche respecte un délai fixe avant de libérer sa place. Les requêtes
//! prioritaires sont insérées en tête de file.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::provider::{HeightProvider, MAX_BATCH_SIZE};
use super::{TerrainError, TerrainPoint};
use crate::config::TerrainConfig;

type CacheKey = (u32, i64, i64);
type BatchResult = Result<Vec<TerrainPoint>, TerrainError>;

/// Clé de cache : deux points à moins d'un centimètre partagent la même entrée
pub fn cache_key(epsg: u32, x: f64, y: f64) -> CacheKey {
    (epsg, (x * 100.0).round() as i64, (y * 100.0).round() as i64)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Job {
    points: Vec<(f64, f64)>,
    epsg: u32,
    reply: oneshot::Sender<BatchResult>,
}

#[derive(Default)]
struct Queue {
    pending: VecDeque<Job>,
    running: usize,
}

struct Inner<P> {
    provider: P,
    batch_size: usize,
    max_concurrent: usize,
    delay: Duration,
    cache: Mutex<HashMap<CacheKey, TerrainPoint>>,
    queue: Mutex<Queue>,
    cache_hits: AtomicUsize,
    requested: AtomicUsize,
}

/// Statistiques d'utilisation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub cache_entries: usize,
    pub cache_hits: usize,
    pub points_requested: usize,
}

/// Service d'altitudes partagé. Le clone partage le cache et la file.
pub struct TerrainService<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for TerrainService<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: HeightProvider> TerrainService<P> {
    pub fn new(provider: P, config: &TerrainConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                batch_size: config.batch_size.clamp(1, MAX_BATCH_SIZE),
                max_concurrent: config.max_concurrent.max(1),
                delay: config.delay,
                cache: Mutex::new(HashMap::new()),
                queue: Mutex::new(Queue::default()),
                cache_hits: AtomicUsize::new(0),
                requested: AtomicUsize::new(0),
            }),
        }
    }

    /// Altitudes des points, dans l'ordre d'entrée. Ne renvoie jamais d'erreur :
    /// un lot en échec donne des points `{z: None, error: true}`.
    pub async fn fetch_heights(&self, points: &[(f64, f64)], epsg: u32) -> Vec<TerrainPoint> {
        self.fetch(points, epsg, false).await
    }

    /// Comme `fetch_heights`, mais les lots passent devant ceux déjà en attente
    pub async fn fetch_heights_priority(&self, points: &[(f64, f64)], epsg: u32) -> Vec<TerrainPoint> {
        self.fetch(points, epsg, true).await
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            cache_entries: lock(&self.inner.cache).len(),
            cache_hits: self.inner.cache_hits.load(Ordering::Relaxed),
            points_requested: self.inner.requested.load(Ordering::Relaxed),
        }
    }

    async fn fetch(&self, points: &[(f64, f64)], epsg: u32, priority: bool) -> Vec<TerrainPoint> {
        let mut results: Vec<Option<TerrainPoint>> = vec![None; points.len()];

        // Points manquants, dédoublonnés par clé de cache
        let mut misses: Vec<(CacheKey, (f64, f64), Vec<usize>)> = Vec::new();
        {
            let cache = lock(&self.inner.cache);
            let mut slots: HashMap<CacheKey, usize> = HashMap::new();
            for (i, &(x, y)) in points.iter().enumerate() {
                let key = cache_key(epsg, x, y);
                if let Some(hit) = cache.get(&key) {
                    results[i] = Some(hit.clone());
                } else if let Some(&slot) = slots.get(&key) {
                    misses[slot].2.push(i);
                } else {
                    slots.insert(key, misses.len());
                    misses.push((key, (x, y), vec![i]));
                }
            }
        }

        let hits = results.iter().filter(|r| r.is_some()).count();
        self.inner.cache_hits.fetch_add(hits, Ordering::Relaxed);
        debug!(points = points.len(), hits, misses = misses.len(), priority, "Terrain lookup");

        if !misses.is_empty() {
            let chunks: Vec<&[(CacheKey, (f64, f64), Vec<usize>)]> =
                misses.chunks(self.inner.batch_size).collect();

            let receivers = self.submit(
                chunks
                    .iter()
                    .map(|chunk| chunk.iter().map(|(_, xy, _)| *xy).collect())
                    .collect(),
                epsg,
                priority,
            );

            for (chunk, outcome) in chunks.iter().zip(join_all(receivers).await) {
                let outcome = outcome.unwrap_or(Err(TerrainError::QueueClosed));
                match outcome {
                    Ok(heights) => {
                        for ((_, _, indices), height) in chunk.iter().zip(heights) {
                            for &i in indices {
                                results[i] = Some(height.clone());
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, points = chunk.len(), epsg, "Terrain batch failed");
                        for (_, (x, y), indices) in chunk.iter() {
                            for &i in indices {
                                results[i] = Some(TerrainPoint::failed(*x, *y));
                            }
                        }
                    }
                }
            }
        }

        // Chaque résultat porte la position demandée, pas celle du point mis en cache
        points
            .iter()
            .zip(results)
            .map(|(&(x, y), r)| match r {
                Some(height) => TerrainPoint { x, y, ..height },
                None => TerrainPoint::failed(x, y),
            })
            .collect()
    }

    /// Place les lots dans la file et démarre les tâches disponibles
    fn submit(
        &self,
        batches: Vec<Vec<(f64, f64)>>,
        epsg: u32,
        priority: bool,
    ) -> Vec<oneshot::Receiver<BatchResult>> {
        let mut receivers = Vec::with_capacity(batches.len());
        let mut jobs = Vec::with_capacity(batches.len());
        for points in batches {
            let (reply, rx) = oneshot::channel();
            self.inner.requested.fetch_add(points.len(), Ordering::Relaxed);
            jobs.push(Job { points, epsg, reply });
            receivers.push(rx);
        }

        {
            let mut queue = lock(&self.inner.queue);
            if priority {
                // En tête, en conservant l'ordre relatif des lots
                for job in jobs.into_iter().rev() {
                    queue.pending.push_front(job);
                }
            } else {
                queue.pending.extend(jobs);
            }
        }

        drain(&self.inner);
        receivers
    }
}

/// Démarre autant de lots que la limite de concurrence le permet
fn drain<P: HeightProvider>(inner: &Arc<Inner<P>>) {
    let mut queue = lock(&inner.queue);
    while queue.running < inner.max_concurrent {
        let Some(job) = queue.pending.pop_front() else {
            break;
        };
        queue.running += 1;

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let outcome = inner.provider.fetch_batch(&job.points, job.epsg).await;

            if let Ok(heights) = &outcome {
                let mut cache = lock(&inner.cache);
                for (&(x, y), height) in job.points.iter().zip(heights) {
                    cache.insert(cache_key(job.epsg, x, y), height.clone());
                }
            }
            // Le demandeur a pu abandonner sa requête
            let _ = job.reply.send(outcome);

            tokio::time::sleep(inner.delay).await;

            lock(&inner.queue).running -= 1;
            drain(&inner);
        });
    }
}
