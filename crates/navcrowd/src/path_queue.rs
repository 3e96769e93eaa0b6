//! Amortized path request queue
//!
//! Long path searches are queued and advanced a bounded number of search
//! iterations per tick. Each request gets a monotonically increasing handle;
//! an agent submitting a new request supersedes its previous one.

use log::{debug, trace, warn};
use navcrowd_query::{NavMeshQuery, PathResult, PolyRef, QueryFilter, QueryResult, Status};

/// Handle of a queued path request
pub type PathQueueRef = u32;

/// Handle value that never refers to a request
pub const PATHQ_INVALID: PathQueueRef = 0;

/// Number of requests that can be in flight at once
pub const MAX_QUEUE: usize = 8;

/// Number of updates an unread result is kept around
pub const MAX_KEEP_ALIVE: u32 = 2;

/// Status of a queued request as seen by its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathQueueStatus {
    InProgress,
    Success,
    Failed,
    /// Unknown, superseded, expired or already read
    Invalid,
}

struct PathQuery<S> {
    reference: PathQueueRef,
    agent: usize,
    start_pos: [f32; 3],
    end_pos: [f32; 3],
    start_ref: PolyRef,
    end_ref: PolyRef,
    filter: QueryFilter,
    search: Option<S>,
    result: PathResult,
    status: Status,
    keep_alive: u32,
}

/// Bounded queue of sliced path searches
pub struct PathQueue<Q: NavMeshQuery> {
    queue: Vec<Option<PathQuery<Q::SlicedSearch>>>,
    next_handle: PathQueueRef,
    max_path_size: usize,
}

impl<Q: NavMeshQuery> PathQueue<Q> {
    /// Creates an empty queue whose results hold at most `max_path_size`
    /// polygons
    pub fn new(max_path_size: usize) -> Self {
        Self {
            queue: (0..MAX_QUEUE).map(|_| None).collect(),
            next_handle: 1,
            max_path_size: max_path_size.max(1),
        }
    }

    /// Queues a path search on behalf of `agent`.
    ///
    /// Any request still held for the same agent is dropped. Returns
    /// [`PATHQ_INVALID`] when every slot is busy.
    pub fn request(
        &mut self,
        agent: usize,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
    ) -> PathQueueRef {
        for slot in self.queue.iter_mut() {
            if slot.as_ref().is_some_and(|q| q.agent == agent) {
                if let Some(old) = slot.take() {
                    trace!("Path request {} of agent {} superseded", old.reference, agent);
                }
            }
        }

        let Some(slot) = self.queue.iter_mut().find(|s| s.is_none()) else {
            warn!("Path queue full, request of agent {} rejected", agent);
            return PATHQ_INVALID;
        };

        let reference = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1);
        if self.next_handle == PATHQ_INVALID {
            self.next_handle = 1;
        }

        *slot = Some(PathQuery {
            reference,
            agent,
            start_pos: *start_pos,
            end_pos: *end_pos,
            start_ref,
            end_ref,
            filter: filter.clone(),
            search: None,
            result: PathResult::default(),
            status: Status::InProgress,
            keep_alive: 0,
        });

        debug!(
            "Queued path request {} for agent {}: {} -> {}",
            reference, agent, start_ref, end_ref
        );
        reference
    }

    /// Advances pending searches, oldest first, spending at most `max_iters`
    /// search iterations in total.
    pub fn update(&mut self, navquery: &Q, max_iters: usize) {
        let mut order: Vec<usize> = (0..self.queue.len()).filter(|&i| self.queue[i].is_some()).collect();
        order.sort_by_key(|&i| self.queue[i].as_ref().map_or(PATHQ_INVALID, |q| q.reference));

        let mut iters_left = max_iters;
        for i in order {
            let slot = &mut self.queue[i];
            let Some(q) = slot.as_mut() else {
                continue;
            };

            if !q.status.is_in_progress() {
                // Unread results expire
                q.keep_alive += 1;
                if q.keep_alive > MAX_KEEP_ALIVE {
                    trace!("Path request {} expired", q.reference);
                    *slot = None;
                }
                continue;
            }

            if iters_left == 0 {
                continue;
            }

            if q.search.is_none() {
                match navquery.init_sliced_find_path(q.start_ref, q.end_ref, &q.start_pos, &q.end_pos, &q.filter) {
                    Ok(search) => q.search = Some(search),
                    Err(status) => {
                        debug!("Path request {} could not start: {}", q.reference, status);
                        q.status = Status::Failure;
                        continue;
                    }
                }
            }
            let Some(search) = q.search.as_mut() else {
                continue;
            };

            let (iters, status) = navquery.update_sliced_find_path(search, iters_left);
            iters_left = iters_left.saturating_sub(iters);

            if status.is_failure() {
                q.status = Status::Failure;
                q.search = None;
            } else if !status.is_in_progress() {
                match navquery.finalize_sliced_find_path(search, self.max_path_size) {
                    Ok(result) => {
                        trace!(
                            "Path request {} done: {} polys{}",
                            q.reference,
                            result.path.len(),
                            if result.partial { " (partial)" } else { "" }
                        );
                        q.result = result;
                        q.status = Status::Success;
                    }
                    Err(status) => {
                        debug!("Path request {} could not finalize: {}", q.reference, status);
                        q.status = Status::Failure;
                    }
                }
                q.search = None;
            }
        }
    }

    fn find(&self, reference: PathQueueRef) -> Option<usize> {
        if reference == PATHQ_INVALID {
            return None;
        }
        self.queue
            .iter()
            .position(|s| s.as_ref().is_some_and(|q| q.reference == reference))
    }

    /// Status of the request behind `reference`
    pub fn get_request_status(&self, reference: PathQueueRef) -> PathQueueStatus {
        match self.find(reference).and_then(|i| self.queue[i].as_ref()) {
            None => PathQueueStatus::Invalid,
            Some(q) if q.status.is_in_progress() => PathQueueStatus::InProgress,
            Some(q) if q.status.is_success() => PathQueueStatus::Success,
            Some(_) => PathQueueStatus::Failed,
        }
    }

    /// Takes the result of a finished request and frees its slot
    pub fn get_path_result(&mut self, reference: PathQueueRef) -> QueryResult<PathResult> {
        let i = self.find(reference).ok_or(Status::InvalidParam)?;
        let status = self.queue[i].as_ref().map_or(Status::InvalidParam, |q| q.status);
        if status.is_in_progress() {
            return Err(status);
        }
        let q = self.queue[i].take().ok_or(Status::InvalidParam)?;
        if q.status.is_success() {
            Ok(q.result)
        } else {
            Err(q.status)
        }
    }

    /// Number of requests still searching
    pub fn get_pending_count(&self) -> usize {
        self.queue
            .iter()
            .flatten()
            .filter(|q| q.status.is_in_progress())
            .count()
    }

    /// Number of occupied slots, finished results included
    pub fn get_slot_count(&self) -> usize {
        self.queue.iter().flatten().count()
    }

    pub fn get_max_path_size(&self) -> usize {
        self.max_path_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::*;
    use navcrowd_query::PolyMesh;

    fn request_across(queue: &mut PathQueue<PolyMesh>, mesh: &PolyMesh, agent: usize) -> PathQueueRef {
        let cols = mesh.stats().bmax[0] as usize;
        queue.request(
            agent,
            cell_ref(mesh, 0, 0),
            cell_ref(mesh, cols - 1, 0),
            &[0.5, 0.0, 0.5],
            &[cols as f32 - 0.5, 0.0, 0.5],
            &QueryFilter::default(),
        )
    }

    #[test]
    fn test_request_and_complete() {
        let mesh = open_grid(6, 1);
        let mut queue = PathQueue::new(256);

        let r = request_across(&mut queue, &mesh, 0);
        assert_ne!(r, PATHQ_INVALID);
        assert_eq!(queue.get_request_status(r), PathQueueStatus::InProgress);
        assert_eq!(queue.get_pending_count(), 1);

        queue.update(&mesh, 100);
        assert_eq!(queue.get_request_status(r), PathQueueStatus::Success);

        let result = queue.get_path_result(r).unwrap();
        assert_eq!(result.path.len(), 6);
        assert!(!result.partial);

        // Reading consumes the result
        assert_eq!(queue.get_request_status(r), PathQueueStatus::Invalid);
        assert!(queue.get_path_result(r).is_err());
    }

    #[test]
    fn test_request_supersedes_same_agent() {
        let mesh = open_grid(6, 1);
        let mut queue = PathQueue::new(256);

        let first = request_across(&mut queue, &mesh, 3);
        let second = request_across(&mut queue, &mesh, 3);
        assert!(second > first);
        assert_eq!(queue.get_request_status(first), PathQueueStatus::Invalid);
        assert_eq!(queue.get_request_status(second), PathQueueStatus::InProgress);
        assert_eq!(queue.get_slot_count(), 1);
    }

    #[test]
    fn test_queue_capacity() {
        let mesh = open_grid(6, 1);
        let mut queue = PathQueue::new(256);

        for agent in 0..MAX_QUEUE {
            assert_ne!(request_across(&mut queue, &mesh, agent), PATHQ_INVALID);
        }
        assert_eq!(request_across(&mut queue, &mesh, MAX_QUEUE), PATHQ_INVALID);

        // A queued agent may still replace its own request
        assert_ne!(request_across(&mut queue, &mesh, 0), PATHQ_INVALID);
    }

    #[test]
    fn test_budget_spans_ticks() {
        let mesh = open_grid(30, 1);
        let mut queue = PathQueue::new(256);
        let r = request_across(&mut queue, &mesh, 0);

        queue.update(&mesh, 10);
        assert_eq!(queue.get_request_status(r), PathQueueStatus::InProgress);
        queue.update(&mesh, 10);
        assert_eq!(queue.get_request_status(r), PathQueueStatus::InProgress);
        queue.update(&mesh, 10);
        assert_eq!(queue.get_request_status(r), PathQueueStatus::Success);
    }

    #[test]
    fn test_oldest_request_served_first() {
        let mesh = open_grid(30, 1);
        let mut queue = PathQueue::new(256);
        let a = request_across(&mut queue, &mesh, 0);
        let b = request_across(&mut queue, &mesh, 1);

        queue.update(&mesh, 30);
        assert_eq!(queue.get_request_status(a), PathQueueStatus::Success);
        assert_eq!(queue.get_request_status(b), PathQueueStatus::InProgress);
    }

    #[test]
    fn test_unread_results_expire() {
        let mesh = open_grid(4, 1);
        let mut queue = PathQueue::new(256);
        let r = request_across(&mut queue, &mesh, 0);

        queue.update(&mesh, 100);
        for _ in 0..MAX_KEEP_ALIVE {
            queue.update(&mesh, 100);
            assert_eq!(queue.get_request_status(r), PathQueueStatus::Success);
        }
        queue.update(&mesh, 100);
        assert_eq!(queue.get_request_status(r), PathQueueStatus::Invalid);
        assert_eq!(queue.get_slot_count(), 0);
    }

    #[test]
    fn test_invalid_start_fails() {
        let mesh = open_grid(4, 1);
        let mut queue = PathQueue::new(256);
        let r = queue.request(
            0,
            PolyRef::new(99),
            cell_ref(&mesh, 3, 0),
            &[0.5, 0.0, 0.5],
            &[3.5, 0.0, 0.5],
            &QueryFilter::default(),
        );
        queue.update(&mesh, 100);
        assert_eq!(queue.get_request_status(r), PathQueueStatus::Failed);
        assert_eq!(queue.get_path_result(r), Err(Status::Failure));
        assert_eq!(queue.get_request_status(PATHQ_INVALID), PathQueueStatus::Invalid);
    }
}
