//! Crowd management
//!
//! The crowd owns a fixed pool of agents and moves them over a navigation
//! mesh every tick. Agents follow a [`PathCorridor`] toward their target,
//! steer around each other with sampled velocity obstacles and are kept on
//! the walkable surface. Callers only ever request targets or velocities:
//! positions and velocities are outputs of [`Crowd::update`].

use log::{debug, trace, warn};
use navcrowd_common::{
    sqr, tri_area_2d, vadd, vdist_2d, vdist_2d_sqr, vlen, vlen_sqr, vlerp, vmad, vnormalize, vscale, vsub, Error,
    Result, Status,
};
use navcrowd_query::{NavMeshQuery, PolyRef, QueryFilter, StraightPathFlags, StraightPathPoint};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::local_boundary::{LocalBoundary, MAX_LOCAL_SEGS};
use crate::move_request::{MoveRequestEvent, MoveRequestState};
use crate::obstacle_avoidance::{ObstacleAvoidanceDebugData, ObstacleAvoidanceParams, ObstacleAvoidanceQuery};
use crate::path_corridor::PathCorridor;
use crate::path_queue::{PathQueue, PathQueueRef, PathQueueStatus, MAX_QUEUE, PATHQ_INVALID};
use crate::proximity_grid::ProximityGrid;

/// The maximum number of neighbours that a crowd agent can take into account
/// for steering decisions.
pub const MAX_NEIGHBOURS: usize = 6;

/// The maximum number of corners a crowd agent will look ahead in the path.
pub const MAX_CORNERS: usize = 4;

/// The maximum number of avoidance configurations supported by the crowd.
pub const MAX_AVOIDANCE_PARAMS: usize = 8;

/// The maximum number of query filter types supported by the crowd.
pub const MAX_FILTER_TYPES: usize = 16;

/// Path search iterations shared by all queued requests per tick
pub const MAX_ITERS_PER_UPDATE: usize = 100;

/// Iterations of the quick search run when a target is requested
const MAX_QUICK_SEARCH_ITER: usize = 20;

/// Polygons kept from the quick search
const MAX_QUICK_SEARCH_RES: usize = 32;

/// Off-mesh connections trigger within this many agent radii
const OFFMESH_TRIGGER_RADIUS_SCALE: f32 = 2.25;

/// Fraction of the penetration resolved per collision iteration
const COLLISION_RESOLVE_FACTOR: f32 = 0.7;

/// Samples kept by the avoidance debug recorder
const MAX_DEBUG_SAMPLES: usize = 2048;

const DEFAULT_AGENT_RADIUS: f32 = 0.6;
const DEFAULT_AGENT_HEIGHT: f32 = 2.0;
const DEFAULT_AGENT_MAX_ACCELERATION: f32 = 8.0;
const DEFAULT_AGENT_MAX_SPEED: f32 = 3.5;

/// Physical state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CrowdAgentState {
    /// The agent is not on the navigation mesh
    #[default]
    Invalid,
    /// The agent is traversing a normal navigation mesh polygon
    Walking,
    /// The agent is traversing an off-mesh connection
    OffMesh,
}

/// Steering behaviours enabled for an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateFlags(pub u8);

impl UpdateFlags {
    pub const ANTICIPATE_TURNS: UpdateFlags = UpdateFlags(1);
    pub const OBSTACLE_AVOIDANCE: UpdateFlags = UpdateFlags(2);
    pub const SEPARATION: UpdateFlags = UpdateFlags(4);
    pub const OPTIMIZE_VIS: UpdateFlags = UpdateFlags(8);
    pub const OPTIMIZE_TOPO: UpdateFlags = UpdateFlags(16);

    pub const fn empty() -> Self {
        UpdateFlags(0)
    }

    /// Check if flags contain the specified flag
    pub fn contains(&self, other: UpdateFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for UpdateFlags {
    fn default() -> Self {
        UpdateFlags::ANTICIPATE_TURNS | UpdateFlags::OBSTACLE_AVOIDANCE | UpdateFlags::SEPARATION
    }
}

impl std::ops::BitOr for UpdateFlags {
    type Output = UpdateFlags;

    fn bitor(self, rhs: UpdateFlags) -> UpdateFlags {
        UpdateFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for UpdateFlags {
    fn bitor_assign(&mut self, rhs: UpdateFlags) {
        self.0 |= rhs.0;
    }
}

/// Configuration of a crowd agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentParams {
    /// Radius of the agent
    pub radius: f32,
    /// Height of the agent
    pub height: f32,
    /// Maximum acceleration of the agent
    pub max_acceleration: f32,
    /// Maximum speed of the agent
    pub max_speed: f32,
    /// Range within which neighbours and walls are considered for steering
    pub collision_query_range: f32,
    /// Range of the path visibility optimization
    pub path_optimization_range: f32,
    /// How strongly the agent keeps away from its neighbours
    pub separation_weight: f32,
    /// Update flags for the agent
    pub update_flags: UpdateFlags,
    /// Index of the avoidance parameter set
    pub obstacle_avoidance_type: u8,
    /// Index of the query filter
    pub query_filter_type: u8,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            radius: DEFAULT_AGENT_RADIUS,
            height: DEFAULT_AGENT_HEIGHT,
            max_acceleration: DEFAULT_AGENT_MAX_ACCELERATION,
            max_speed: DEFAULT_AGENT_MAX_SPEED,
            collision_query_range: 12.0,
            path_optimization_range: 30.0,
            separation_weight: 2.0,
            update_flags: UpdateFlags::default(),
            obstacle_avoidance_type: 0,
            query_filter_type: 0,
        }
    }
}

impl AgentParams {
    /// Checks the parameter ranges
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.radius > 0.0, "radius must be positive"),
            (self.height > 0.0, "height must be positive"),
            (self.max_acceleration >= 0.0, "max_acceleration must not be negative"),
            (self.max_speed >= 0.0, "max_speed must not be negative"),
            (self.collision_query_range > 0.0, "collision_query_range must be positive"),
            (self.path_optimization_range >= 0.0, "path_optimization_range must not be negative"),
            (self.separation_weight >= 0.0, "separation_weight must not be negative"),
            (
                (self.obstacle_avoidance_type as usize) < MAX_AVOIDANCE_PARAMS,
                "obstacle_avoidance_type out of range",
            ),
            ((self.query_filter_type as usize) < MAX_FILTER_TYPES, "query_filter_type out of range"),
        ];
        // NaN fails every comparison above
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(Error::InvalidParam((*msg).to_string())),
            None => Ok(()),
        }
    }
}

/// Crowd wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrowdConfig {
    /// Number of agent slots
    pub max_agents: usize,
    /// Largest agent radius, sizes the proximity grid and placement extents
    pub max_agent_radius: f32,
    /// Longest polygon path a corridor holds
    pub max_path_result: usize,
    /// Path search iterations spent on queued requests per tick
    pub max_iters_per_update: usize,
    /// Agents whose corridor topology is optimized per tick
    pub max_topology_optimizations_per_tick: usize,
    /// Seconds an agent waits between topology optimizations
    pub topology_optimization_interval: f32,
    /// Corridor polygons checked for validity every tick
    pub path_check_lookahead: usize,
    /// Seconds a partial path is followed before replanning
    pub target_replan_delay: f32,
    /// Passes of the pairwise collision resolution
    pub collision_resolve_iterations: usize,
}

impl Default for CrowdConfig {
    fn default() -> Self {
        Self {
            max_agents: 128,
            max_agent_radius: DEFAULT_AGENT_RADIUS,
            max_path_result: 256,
            max_iters_per_update: MAX_ITERS_PER_UPDATE,
            max_topology_optimizations_per_tick: 1,
            topology_optimization_interval: 0.5,
            path_check_lookahead: 10,
            target_replan_delay: 1.0,
            collision_resolve_iterations: 4,
        }
    }
}

impl CrowdConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_agents == 0 {
            return Err(Error::InvalidParam("max_agents must be positive".into()));
        }
        if !(self.max_agent_radius > 0.0 && self.max_agent_radius.is_finite()) {
            return Err(Error::InvalidParam(format!(
                "max_agent_radius must be positive, got {}",
                self.max_agent_radius
            )));
        }
        if self.max_path_result == 0 {
            return Err(Error::InvalidParam("max_path_result must be positive".into()));
        }
        if self.topology_optimization_interval < 0.0 || self.target_replan_delay < 0.0 {
            return Err(Error::InvalidParam("intervals must not be negative".into()));
        }
        Ok(())
    }
}

/// A neighbour of an agent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrowdNeighbour {
    /// Slot index of the neighbour
    pub idx: usize,
    /// Squared planar distance to the neighbour
    pub dist: f32,
}

/// Progress of an off-mesh connection traversal
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CrowdAgentAnimation {
    pub active: bool,
    pub init_pos: [f32; 3],
    pub start_pos: [f32; 3],
    pub end_pos: [f32; 3],
    pub poly_ref: PolyRef,
    pub t: f32,
    pub tmax: f32,
}

/// Debug output for one selected agent
#[derive(Debug, Clone)]
pub struct CrowdAgentDebugInfo {
    /// Slot index of the inspected agent
    pub idx: usize,
    /// Start of the last visibility optimization ray
    pub opt_start: [f32; 3],
    /// End of the last visibility optimization ray
    pub opt_end: [f32; 3],
    /// Velocity samples of the last avoidance pass
    pub vod: ObstacleAvoidanceDebugData,
}

impl CrowdAgentDebugInfo {
    pub fn new(idx: usize) -> Self {
        Self {
            idx,
            opt_start: [0.0; 3],
            opt_end: [0.0; 3],
            vod: ObstacleAvoidanceDebugData::new(MAX_DEBUG_SAMPLES),
        }
    }
}

/// An agent managed by the crowd
#[derive(Debug, Clone)]
pub struct CrowdAgent {
    active: bool,
    state: CrowdAgentState,
    /// The corridor ends short of the target
    partial: bool,
    corridor: PathCorridor,
    boundary: LocalBoundary,
    topology_opt_time: f32,
    neis: Vec<CrowdNeighbour>,
    desired_speed: f32,

    npos: [f32; 3],
    disp: [f32; 3],
    /// Desired velocity from steering
    dvel: [f32; 3],
    /// Velocity chosen by the avoidance solver
    nvel: [f32; 3],
    vel: [f32; 3],

    params: AgentParams,
    corners: Vec<StraightPathPoint>,

    target_state: MoveRequestState,
    target_ref: PolyRef,
    /// Target position, or the requested velocity in velocity mode
    target_pos: [f32; 3],
    target_pathq_ref: PathQueueRef,
    target_replan: bool,
    target_replan_time: f32,

    anim: CrowdAgentAnimation,
}

impl CrowdAgent {
    fn new(max_path: usize) -> Self {
        Self {
            active: false,
            state: CrowdAgentState::Invalid,
            partial: false,
            corridor: PathCorridor::new(max_path),
            boundary: LocalBoundary::new(),
            topology_opt_time: 0.0,
            neis: Vec::with_capacity(MAX_NEIGHBOURS),
            desired_speed: 0.0,
            npos: [0.0; 3],
            disp: [0.0; 3],
            dvel: [0.0; 3],
            nvel: [0.0; 3],
            vel: [0.0; 3],
            params: AgentParams::default(),
            corners: Vec::with_capacity(MAX_CORNERS),
            target_state: MoveRequestState::None,
            target_ref: PolyRef::NULL,
            target_pos: [0.0; 3],
            target_pathq_ref: PATHQ_INVALID,
            target_replan: false,
            target_replan_time: 0.0,
            anim: CrowdAgentAnimation::default(),
        }
    }

    fn place(&mut self, params: AgentParams, poly: PolyRef, pos: [f32; 3]) {
        let max_path = self.corridor.get_max_path();
        *self = Self::new(max_path);
        self.params = params;
        self.corridor.reset(poly, pos);
        self.npos = pos;
        self.state = CrowdAgentState::Walking;
        self.active = true;
    }

    fn is_walking(&self) -> bool {
        self.active && self.state == CrowdAgentState::Walking
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn get_state(&self) -> CrowdAgentState {
        self.state
    }

    pub fn get_params(&self) -> &AgentParams {
        &self.params
    }

    /// Current position
    pub fn get_pos(&self) -> [f32; 3] {
        self.npos
    }

    /// Current velocity
    pub fn get_vel(&self) -> [f32; 3] {
        self.vel
    }

    /// Velocity the agent wanted before avoidance
    pub fn get_desired_vel(&self) -> [f32; 3] {
        self.dvel
    }

    /// Velocity chosen by obstacle avoidance
    pub fn get_new_vel(&self) -> [f32; 3] {
        self.nvel
    }

    pub fn get_desired_speed(&self) -> f32 {
        self.desired_speed
    }

    pub fn get_target_state(&self) -> MoveRequestState {
        self.target_state
    }

    pub fn get_target_ref(&self) -> PolyRef {
        self.target_ref
    }

    /// Target position, or the requested velocity in velocity mode
    pub fn get_target_pos(&self) -> [f32; 3] {
        self.target_pos
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn get_corridor(&self) -> &PathCorridor {
        &self.corridor
    }

    pub fn get_boundary(&self) -> &LocalBoundary {
        &self.boundary
    }

    /// Neighbours sorted by distance, closest first
    pub fn get_neighbours(&self) -> &[CrowdNeighbour] {
        &self.neis
    }

    /// Corners the agent steers toward
    pub fn get_corners(&self) -> &[StraightPathPoint] {
        &self.corners
    }

    /// The off-mesh traversal in progress
    pub fn get_animation(&self) -> Option<&CrowdAgentAnimation> {
        self.anim.active.then_some(&self.anim)
    }
}

/// Read-only view of an agent used while other agents are mutated
#[derive(Debug, Clone, Copy)]
struct AgentSnapshot {
    pos: [f32; 3],
    vel: [f32; 3],
    dvel: [f32; 3],
    radius: f32,
    height: f32,
}

impl AgentSnapshot {
    fn of(ag: &CrowdAgent) -> Self {
        Self {
            pos: ag.npos,
            vel: ag.vel,
            dvel: ag.dvel,
            radius: ag.params.radius,
            height: ag.params.height,
        }
    }
}

/// Feeds `event` through the move request state machine of `ag`
fn apply_move_event(ag: &mut CrowdAgent, idx: usize, event: MoveRequestEvent) {
    match ag.target_state.transition(event) {
        Some(next) => {
            if next != ag.target_state {
                debug!("Agent {}: {:?} -> {:?}", idx, ag.target_state, next);
            }
            ag.target_state = next;
        }
        None => {
            warn!(
                "Agent {}: ignoring move request event {:?} in state {:?}",
                idx, event, ag.target_state
            );
            if cfg!(test) {
                panic!("illegal move request transition {:?} on {:?}", event, ag.target_state);
            }
        }
    }
}

/// Crowd of agents sharing one navigation mesh
pub struct Crowd<Q: NavMeshQuery> {
    config: CrowdConfig,
    agents: Vec<CrowdAgent>,
    path_queue: PathQueue<Q>,
    obstacle_params: [ObstacleAvoidanceParams; MAX_AVOIDANCE_PARAMS],
    filters: Vec<QueryFilter>,
    grid: ProximityGrid,
    agent_placement_half_extents: [f32; 3],
    velocity_sample_count: usize,
    navquery: Q,
}

impl<Q: NavMeshQuery> Crowd<Q> {
    /// Creates a crowd of `max_agents` slots over `navquery`
    pub fn new(max_agents: usize, max_agent_radius: f32, navquery: Q) -> Result<Self> {
        Self::with_config(
            CrowdConfig {
                max_agents,
                max_agent_radius,
                ..Default::default()
            },
            navquery,
        )
    }

    pub fn with_config(config: CrowdConfig, navquery: Q) -> Result<Self> {
        config.validate()?;

        let r = config.max_agent_radius;
        let agents = (0..config.max_agents)
            .map(|_| CrowdAgent::new(config.max_path_result))
            .collect();

        debug!(
            "Created crowd with {} agent slots, max radius {}",
            config.max_agents, config.max_agent_radius
        );

        Ok(Self {
            agents,
            path_queue: PathQueue::new(config.max_path_result),
            obstacle_params: [ObstacleAvoidanceParams::default(); MAX_AVOIDANCE_PARAMS],
            filters: vec![QueryFilter::default(); MAX_FILTER_TYPES],
            grid: ProximityGrid::new(r * 3.0),
            agent_placement_half_extents: [r * 2.0, r * 1.5, r * 2.0],
            velocity_sample_count: 0,
            navquery,
            config,
        })
    }

    pub fn get_config(&self) -> &CrowdConfig {
        &self.config
    }

    /// Number of agent slots
    pub fn get_agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn get_active_agent_count(&self) -> usize {
        self.agents.iter().filter(|a| a.active).count()
    }

    /// Slot indices of the active agents
    pub fn get_active_agents(&self) -> Vec<usize> {
        (0..self.agents.len()).filter(|&i| self.agents[i].active).collect()
    }

    /// The active agent in slot `idx`
    pub fn get_agent(&self, idx: usize) -> Option<&CrowdAgent> {
        self.agents.get(idx).filter(|a| a.active)
    }

    fn agent_mut(&mut self, idx: usize) -> Result<&mut CrowdAgent> {
        self.agents
            .get_mut(idx)
            .filter(|a| a.active)
            .ok_or(Error::AgentNotFound(idx))
    }

    /// Adds an agent at the mesh position nearest to `pos`
    pub fn add_agent(&mut self, pos: &[f32; 3], params: &AgentParams) -> Result<usize> {
        params.validate()?;

        let Some(idx) = self.agents.iter().position(|a| !a.active) else {
            return Err(Error::CapacityExceeded(format!(
                "all {} agent slots are in use",
                self.agents.len()
            )));
        };

        let filter = &self.filters[params.query_filter_type as usize];
        let (poly, nearest) = self
            .navquery
            .find_nearest_poly(pos, &self.agent_placement_half_extents, filter)?;
        if !poly.is_valid() {
            return Err(Error::Query(Status::NotFound));
        }

        self.agents[idx].place(params.clone(), poly, nearest);
        debug!("Added agent {} at {:?} on {}", idx, nearest, poly);
        Ok(idx)
    }

    /// Frees the slot of an agent. The slot is reused by later additions.
    pub fn remove_agent(&mut self, idx: usize) -> Result<()> {
        let ag = self.agent_mut(idx)?;
        let max_path = ag.corridor.get_max_path();
        *ag = CrowdAgent::new(max_path);
        debug!("Removed agent {}", idx);
        Ok(())
    }

    pub fn update_agent_parameters(&mut self, idx: usize, params: &AgentParams) -> Result<()> {
        params.validate()?;
        self.agent_mut(idx)?.params = params.clone();
        Ok(())
    }

    pub fn set_obstacle_avoidance_params(&mut self, idx: usize, params: &ObstacleAvoidanceParams) -> Result<()> {
        let slot = self
            .obstacle_params
            .get_mut(idx)
            .ok_or_else(|| Error::InvalidParam(format!("avoidance parameter index {} out of range", idx)))?;
        *slot = *params;
        Ok(())
    }

    pub fn get_obstacle_avoidance_params(&self, idx: usize) -> Option<&ObstacleAvoidanceParams> {
        self.obstacle_params.get(idx)
    }

    pub fn set_filter(&mut self, idx: usize, filter: QueryFilter) -> Result<()> {
        let slot = self
            .filters
            .get_mut(idx)
            .ok_or_else(|| Error::InvalidParam(format!("filter index {} out of range", idx)))?;
        *slot = filter;
        Ok(())
    }

    pub fn get_filter(&self, idx: usize) -> Option<&QueryFilter> {
        self.filters.get(idx)
    }

    pub fn get_editable_filter(&mut self, idx: usize) -> Option<&mut QueryFilter> {
        self.filters.get_mut(idx)
    }

    /// Half extents used to place agents and targets on the mesh
    pub fn get_query_half_extents(&self) -> &[f32; 3] {
        &self.agent_placement_half_extents
    }

    pub fn get_grid(&self) -> &ProximityGrid {
        &self.grid
    }

    pub fn get_path_queue(&self) -> &PathQueue<Q> {
        &self.path_queue
    }

    pub fn get_nav_query(&self) -> &Q {
        &self.navquery
    }

    /// Mutable access to the mesh, for toggling polygons at runtime
    pub fn get_nav_query_mut(&mut self) -> &mut Q {
        &mut self.navquery
    }

    /// Velocity samples taken by obstacle avoidance during the last update
    pub fn get_velocity_sample_count(&self) -> usize {
        self.velocity_sample_count
    }

    /// Requests a move to `pos` on polygon `poly_ref`.
    ///
    /// The polygon must pass the agent's filter, otherwise the agent keeps its
    /// current request.
    pub fn request_move_target(&mut self, idx: usize, poly_ref: PolyRef, pos: &[f32; 3]) -> Result<()> {
        let filter_idx = self.agent_mut(idx)?.params.query_filter_type as usize;
        if !self.navquery.is_valid_poly_ref(poly_ref, &self.filters[filter_idx]) {
            return Err(Error::Query(Status::InvalidParam));
        }

        let ag = self.agent_mut(idx)?;
        ag.target_ref = poly_ref;
        ag.target_pos = *pos;
        ag.target_pathq_ref = PATHQ_INVALID;
        ag.target_replan = false;
        apply_move_event(ag, idx, MoveRequestEvent::RequestTarget);
        Ok(())
    }

    /// Makes the agent follow `vel` instead of a path
    pub fn request_move_velocity(&mut self, idx: usize, vel: &[f32; 3]) -> Result<()> {
        let ag = self.agent_mut(idx)?;
        if !matches!(
            ag.target_state,
            MoveRequestState::None | MoveRequestState::Valid | MoveRequestState::Velocity
        ) {
            apply_move_event(ag, idx, MoveRequestEvent::Reset);
        }

        ag.target_ref = PolyRef::NULL;
        ag.target_pos = *vel;
        ag.target_pathq_ref = PATHQ_INVALID;
        ag.target_replan = false;
        apply_move_event(ag, idx, MoveRequestEvent::RequestVelocity);
        Ok(())
    }

    /// Clears the move request, the agent comes to a halt
    pub fn reset_move_target(&mut self, idx: usize) -> Result<()> {
        let ag = self.agent_mut(idx)?;
        ag.target_ref = PolyRef::NULL;
        ag.target_pos = [0.0; 3];
        ag.dvel = [0.0; 3];
        ag.target_pathq_ref = PATHQ_INVALID;
        ag.target_replan = false;
        apply_move_event(ag, idx, MoveRequestEvent::Reset);
        Ok(())
    }

    /// Advances the simulation by `dt` seconds
    pub fn update(&mut self, dt: f32, mut debug: Option<&mut CrowdAgentDebugInfo>) {
        self.velocity_sample_count = 0;
        let debug_idx = debug.as_ref().map(|d| d.idx);

        // Register agents to proximity grid
        self.grid.clear();
        for (i, ag) in self.agents.iter().enumerate().filter(|(_, a)| a.active) {
            let p = ag.npos;
            let r = ag.params.radius;
            self.grid.insert(i, p[0] - r, p[2] - r, p[0] + r, p[2] + r);
        }

        self.update_move_request();
        self.check_path_validity(dt);

        // Boundaries, neighbours and corners
        let opt_segment = self.update_neighbourhood(debug_idx);
        if let Some(debug) = debug.as_deref_mut() {
            let (start, end) = opt_segment.unwrap_or(([0.0; 3], [0.0; 3]));
            debug.opt_start = start;
            debug.opt_end = end;
        }

        self.trigger_offmesh_connections();
        self.calc_steering();
        self.plan_velocities(debug);

        if dt > 0.0 {
            self.agents
                .par_iter_mut()
                .filter(|ag| ag.is_walking())
                .for_each(|ag| integrate(ag, dt));

            self.resolve_collisions();

            let navquery = &self.navquery;
            let filters = &self.filters;
            self.agents.par_iter_mut().filter(|ag| ag.is_walking()).for_each(|ag| {
                let filter = &filters[ag.params.query_filter_type as usize];
                // Move along navmesh
                ag.corridor.move_position(&ag.npos, navquery, filter);
                ag.npos = ag.corridor.get_pos();

                // If not using path, truncate the corridor to just one poly
                if !ag.target_state.has_target() {
                    ag.corridor.reset(ag.corridor.get_first_poly(), ag.npos);
                    ag.partial = false;
                }
            });

            self.update_offmesh_animations(dt);
        }

        self.update_topology_optimization(dt);

        trace!(
            "Crowd update dt={}: {} active agents, {} velocity samples, {} pending paths",
            dt,
            self.get_active_agent_count(),
            self.velocity_sample_count,
            self.path_queue.get_pending_count()
        );
    }

    fn update_move_request(&mut self) {
        let navquery = &self.navquery;
        let mut queue: Vec<(f32, usize)> = Vec::new();

        // Fire off new requests
        for (i, ag) in self.agents.iter_mut().enumerate() {
            if !ag.active || ag.state == CrowdAgentState::Invalid {
                continue;
            }

            if ag.target_state == MoveRequestState::Requesting {
                let filter = &self.filters[ag.params.query_filter_type as usize];
                request_path(ag, i, navquery, filter);
            }

            if ag.target_state == MoveRequestState::WaitingForQueue {
                queue.push((ag.target_replan_time, i));
            }
        }

        // Agents waiting longest go first
        queue.sort_by(|a, b| b.0.total_cmp(&a.0));
        queue.truncate(MAX_QUEUE);
        for &(_, i) in &queue {
            let ag = &mut self.agents[i];
            let filter = &self.filters[ag.params.query_filter_type as usize];
            ag.target_pathq_ref = self.path_queue.request(
                i,
                ag.corridor.get_last_poly(),
                ag.target_ref,
                &ag.corridor.get_target(),
                &ag.target_pos,
                filter,
            );
            if ag.target_pathq_ref != PATHQ_INVALID {
                apply_move_event(ag, i, MoveRequestEvent::Queued);
            }
        }

        // Update requests
        self.path_queue.update(navquery, self.config.max_iters_per_update);

        // Process path results
        for (i, ag) in self.agents.iter_mut().enumerate() {
            if !ag.active || ag.target_state != MoveRequestState::WaitingForPath {
                continue;
            }

            match self.path_queue.get_request_status(ag.target_pathq_ref) {
                PathQueueStatus::InProgress => continue,
                PathQueueStatus::Failed | PathQueueStatus::Invalid => {
                    debug!("Agent {}: path search failed", i);
                    let _ = self.path_queue.get_path_result(ag.target_pathq_ref);
                    apply_move_event(ag, i, MoveRequestEvent::PathFailed);
                }
                PathQueueStatus::Success => {
                    let result = self.path_queue.get_path_result(ag.target_pathq_ref);
                    let event = match result {
                        Ok(result) => {
                            ag.partial = result.partial;
                            if apply_path_result(ag, result.path, self.config.max_path_result, navquery) {
                                MoveRequestEvent::PathFound
                            } else {
                                MoveRequestEvent::PathFailed
                            }
                        }
                        Err(_) => MoveRequestEvent::PathFailed,
                    };
                    apply_move_event(ag, i, event);
                }
            }
            ag.target_pathq_ref = PATHQ_INVALID;
            ag.target_replan_time = 0.0;
        }
    }

    fn check_path_validity(&mut self, dt: f32) {
        let navquery = &self.navquery;
        let ext = self.agent_placement_half_extents;
        let lookahead = self.config.path_check_lookahead;

        for (i, ag) in self.agents.iter_mut().enumerate() {
            if !ag.is_walking() {
                continue;
            }
            let filter = &self.filters[ag.params.query_filter_type as usize];

            ag.target_replan_time += dt;
            let mut replan = false;

            // First check that the current location is valid
            let mut agent_ref = ag.corridor.get_first_poly();
            let mut agent_pos = ag.npos;
            if !navquery.is_valid_poly_ref(agent_ref, filter) {
                // Current location is not valid, try to reposition
                match navquery.find_nearest_poly(&ag.npos, &ext, filter) {
                    Ok((r, nearest)) if r.is_valid() => {
                        agent_ref = r;
                        agent_pos = nearest;
                    }
                    _ => {
                        warn!("Agent {} lost the navigation mesh at {:?}", i, ag.npos);
                        ag.corridor.reset(PolyRef::NULL, agent_pos);
                        ag.partial = false;
                        ag.boundary.reset();
                        ag.state = CrowdAgentState::Invalid;
                        continue;
                    }
                }

                // Keep the other valid polygons so the replan can reuse them
                ag.corridor.fix_path_start(agent_ref, &agent_pos);
                ag.boundary.reset();
                ag.npos = agent_pos;
                replan = true;
            }

            if !ag.target_state.has_target() {
                continue;
            }

            // Try to recover move request position
            if ag.target_state != MoveRequestState::Failed {
                if !navquery.is_valid_poly_ref(ag.target_ref, filter) {
                    match navquery.find_nearest_poly(&ag.target_pos, &ext, filter) {
                        Ok((r, nearest)) => {
                            ag.target_ref = r;
                            ag.target_pos = nearest;
                        }
                        Err(_) => ag.target_ref = PolyRef::NULL,
                    }
                    replan = true;
                }

                if !ag.target_ref.is_valid() {
                    debug!("Agent {}: target is no longer reachable", i);
                    ag.corridor.reset(agent_ref, agent_pos);
                    ag.partial = false;
                    ag.dvel = [0.0; 3];
                    ag.target_pathq_ref = PATHQ_INVALID;
                    apply_move_event(ag, i, MoveRequestEvent::Reset);
                    continue;
                }
            }

            // If nearby corridor is not valid, replan
            if !ag.corridor.is_valid(lookahead, navquery, filter) {
                ag.corridor.trim_invalid_path(agent_ref, &agent_pos, navquery, filter);
                ag.boundary.reset();
                replan = true;
            }

            // If the end of the path is near and it is not the requested location, replan
            if ag.target_state == MoveRequestState::Valid
                && ag.target_replan_time > self.config.target_replan_delay
                && ag.corridor.get_path_count() < lookahead
                && ag.corridor.get_last_poly() != ag.target_ref
            {
                replan = true;
            }

            if replan {
                debug!("Agent {}: replanning toward {}", i, ag.target_ref);
                ag.target_pathq_ref = PATHQ_INVALID;
                ag.target_replan = true;
                apply_move_event(ag, i, MoveRequestEvent::Replan);
            }
        }
    }

    /// Refreshes boundaries, neighbours and corners of walking agents.
    ///
    /// Returns the visibility optimization segment of `debug_idx`.
    fn update_neighbourhood(&mut self, debug_idx: Option<usize>) -> Option<([f32; 3], [f32; 3])> {
        let snapshot: Vec<AgentSnapshot> = self.agents.iter().map(AgentSnapshot::of).collect();
        let navquery = &self.navquery;
        let filters = &self.filters;
        let grid = &self.grid;

        let segments: Vec<Option<([f32; 3], [f32; 3])>> = self
            .agents
            .par_iter_mut()
            .enumerate()
            .filter(|(_, ag)| ag.is_walking())
            .filter_map(|(i, ag)| {
                let filter = &filters[ag.params.query_filter_type as usize];

                // Update the collision boundary after certain distance has been
                // passed or if it has become invalid
                let update_thr = ag.params.collision_query_range * 0.25;
                if vdist_2d_sqr(&ag.npos, ag.boundary.get_center()) > sqr(update_thr)
                    || !ag.boundary.is_valid(navquery, filter)
                {
                    ag.boundary.update(
                        ag.corridor.get_first_poly(),
                        &ag.npos,
                        ag.params.collision_query_range,
                        navquery,
                        filter,
                    );
                }

                ag.neis = find_neighbours(
                    i,
                    &ag.npos,
                    ag.params.height,
                    ag.params.collision_query_range,
                    &snapshot,
                    grid,
                );

                ag.corners.clear();
                let mut segment = None;
                if ag.target_state.has_target() {
                    ag.corners = ag.corridor.find_corners(MAX_CORNERS, navquery);

                    // Shortcut to the corner after the next one when it is visible
                    if ag.params.update_flags.contains(UpdateFlags::OPTIMIZE_VIS) && !ag.corners.is_empty() {
                        let target = ag.corners[1.min(ag.corners.len() - 1)].pos;
                        ag.corridor.optimize_path_visibility(
                            &target,
                            ag.params.path_optimization_range,
                            navquery,
                            filter,
                        );
                        segment = Some((ag.corridor.get_pos(), target));
                    }
                }

                (Some(i) == debug_idx).then_some(segment)
            })
            .collect();

        segments.into_iter().flatten().next()
    }

    fn trigger_offmesh_connections(&mut self) {
        let navquery = &self.navquery;

        for (i, ag) in self.agents.iter_mut().enumerate() {
            if !ag.is_walking() || !ag.target_state.has_target() {
                continue;
            }
            let Some(last) = ag.corners.last().copied() else {
                continue;
            };
            if last.flags & StraightPathFlags::OFFMESH_CONNECTION == 0 {
                continue;
            }
            let trigger_radius = ag.params.radius * OFFMESH_TRIGGER_RADIUS_SCALE;
            if vdist_2d_sqr(&ag.npos, &last.pos) >= sqr(trigger_radius) {
                continue;
            }

            // Adjust the path over the off-mesh connection. A blocked
            // connection is picked up by the validity check instead.
            let Some((refs, start_pos, end_pos)) = ag.corridor.move_over_offmesh_connection(last.poly, navquery)
            else {
                continue;
            };

            let tmax = if ag.params.max_speed > 0.0 {
                (vdist_2d(&start_pos, &end_pos) / ag.params.max_speed) * 0.5
            } else {
                0.0
            };
            ag.anim = CrowdAgentAnimation {
                active: true,
                init_pos: ag.npos,
                start_pos,
                end_pos,
                poly_ref: refs[1],
                t: 0.0,
                tmax,
            };
            ag.state = CrowdAgentState::OffMesh;
            ag.corners.clear();
            ag.neis.clear();
            debug!("Agent {} entering off-mesh connection {}", i, refs[1]);
        }
    }

    fn calc_steering(&mut self) {
        let snapshot: Vec<AgentSnapshot> = self.agents.iter().map(AgentSnapshot::of).collect();

        self.agents
            .par_iter_mut()
            .filter(|ag| ag.is_walking() && ag.target_state != MoveRequestState::None)
            .for_each(|ag| {
                let mut dvel = if ag.target_state == MoveRequestState::Velocity {
                    ag.desired_speed = vlen(&ag.target_pos);
                    ag.target_pos
                } else {
                    // Calculate steering direction
                    let dir = if ag.params.update_flags.contains(UpdateFlags::ANTICIPATE_TURNS) {
                        calc_smooth_steer_direction(ag)
                    } else {
                        calc_straight_steer_direction(ag)
                    };

                    // Slow down at the end of the path
                    let slow_down_radius = ag.params.radius * 2.0;
                    let speed_scale = get_distance_to_goal(ag, slow_down_radius) / slow_down_radius;

                    ag.desired_speed = ag.params.max_speed;
                    vscale(&dir, ag.desired_speed * speed_scale)
                };

                if ag.params.update_flags.contains(UpdateFlags::SEPARATION) {
                    dvel = apply_separation(ag, dvel, &snapshot);
                }

                ag.dvel = dvel;
            });
    }

    fn plan_velocities(&mut self, debug: Option<&mut CrowdAgentDebugInfo>) {
        let snapshot: Vec<AgentSnapshot> = self.agents.iter().map(AgentSnapshot::of).collect();
        let obstacle_params = &self.obstacle_params;
        let debug_idx = debug.as_ref().map(|d| d.idx);

        let mut sample_count: usize = self
            .agents
            .par_iter_mut()
            .enumerate()
            .filter(|(i, ag)| ag.is_walking() && Some(*i) != debug_idx)
            .map_init(
                || ObstacleAvoidanceQuery::new(MAX_NEIGHBOURS, MAX_LOCAL_SEGS),
                |query, (_, ag)| plan_velocity(ag, &snapshot, query, obstacle_params, None),
            )
            .sum();

        if let Some(debug) = debug {
            if let Some(ag) = self.agents.get_mut(debug.idx).filter(|ag| ag.is_walking()) {
                let mut query = ObstacleAvoidanceQuery::new(MAX_NEIGHBOURS, MAX_LOCAL_SEGS);
                sample_count += plan_velocity(ag, &snapshot, &mut query, obstacle_params, Some(&mut debug.vod));
                debug.vod.normalize_samples();
            }
        }

        self.velocity_sample_count = sample_count;
    }

    fn resolve_collisions(&mut self) {
        for _ in 0..self.config.collision_resolve_iterations {
            for i in 0..self.agents.len() {
                let ag = &self.agents[i];
                if !ag.is_walking() {
                    continue;
                }

                let mut disp = [0.0; 3];
                let mut w = 0.0;
                for nei in &ag.neis {
                    let other = &self.agents[nei.idx];
                    let mut diff = vsub(&ag.npos, &other.npos);
                    diff[1] = 0.0;

                    let radii = ag.params.radius + other.params.radius;
                    let dist_sqr = vlen_sqr(&diff);
                    if dist_sqr > sqr(radii) {
                        continue;
                    }
                    let dist = dist_sqr.sqrt();
                    let pen = if dist < 0.0001 {
                        // Agents on top of each other, try to choose diverging
                        // separation directions
                        diff = if i > nei.idx {
                            [-ag.dvel[2], 0.0, ag.dvel[0]]
                        } else {
                            [ag.dvel[2], 0.0, -ag.dvel[0]]
                        };
                        0.01
                    } else {
                        (1.0 / dist) * ((radii - dist) * 0.5) * COLLISION_RESOLVE_FACTOR
                    };

                    disp = vmad(&disp, &diff, pen);
                    w += 1.0;
                }

                if w > 0.0001 {
                    disp = vscale(&disp, 1.0 / w);
                }
                self.agents[i].disp = disp;
            }

            for ag in self.agents.iter_mut().filter(|ag| ag.is_walking()) {
                ag.npos = vadd(&ag.npos, &ag.disp);
            }
        }
    }

    fn update_offmesh_animations(&mut self, dt: f32) {
        for (i, ag) in self.agents.iter_mut().enumerate() {
            if !ag.active || !ag.anim.active {
                continue;
            }
            let anim = &mut ag.anim;

            anim.t += dt;
            if anim.t > anim.tmax {
                // Prepare agent for walking
                anim.active = false;
                ag.state = CrowdAgentState::Walking;
                debug!("Agent {} left off-mesh connection", i);
                continue;
            }

            // Update position
            let ta = anim.tmax * 0.15;
            let tb = anim.tmax;
            ag.npos = if anim.t < ta {
                vlerp(&anim.init_pos, &anim.start_pos, tween(anim.t, 0.0, ta))
            } else {
                vlerp(&anim.start_pos, &anim.end_pos, tween(anim.t, ta, tb))
            };

            ag.vel = [0.0; 3];
            ag.dvel = [0.0; 3];
        }
    }

    fn update_topology_optimization(&mut self, dt: f32) {
        let mut queue: Vec<(f32, usize)> = Vec::new();

        for (i, ag) in self.agents.iter_mut().enumerate() {
            if !ag.is_walking()
                || !ag.target_state.has_target()
                || !ag.params.update_flags.contains(UpdateFlags::OPTIMIZE_TOPO)
            {
                continue;
            }
            ag.topology_opt_time += dt;
            if ag.topology_opt_time >= self.config.topology_optimization_interval {
                queue.push((ag.topology_opt_time, i));
            }
        }

        // Longest waiting first
        queue.sort_by(|a, b| b.0.total_cmp(&a.0));
        queue.truncate(self.config.max_topology_optimizations_per_tick);

        for (_, i) in queue {
            let ag = &mut self.agents[i];
            let filter = &self.filters[ag.params.query_filter_type as usize];
            if ag.corridor.optimize_path_topology(&self.navquery, filter) {
                trace!("Agent {}: corridor topology shortened", i);
            }
            ag.topology_opt_time = 0.0;
        }
    }
}

/// Processes a `Requesting` agent: reuse the corridor when it already
/// reaches the target, else run a quick search and queue a full one when it
/// falls short.
fn request_path<Q: NavMeshQuery>(ag: &mut CrowdAgent, idx: usize, navquery: &Q, filter: &QueryFilter) {
    let path = ag.corridor.get_path().to_vec();
    let Some(&first) = path.first() else {
        apply_move_event(ag, idx, MoveRequestEvent::PathFailed);
        return;
    };

    // The target is already inside the corridor
    if let Some(k) = path.iter().position(|&p| p == ag.target_ref) {
        ag.corridor.set_corridor(&ag.target_pos, &path[..=k], navquery);
        ag.boundary.reset();
        ag.partial = false;
        ag.target_replan_time = 0.0;
        apply_move_event(ag, idx, MoveRequestEvent::PathFound);
        return;
    }

    // Quick search towards the goal
    let mut search = match navquery.init_sliced_find_path(first, ag.target_ref, &ag.npos, &ag.target_pos, filter) {
        Ok(search) => search,
        Err(status) => {
            debug!("Agent {}: cannot search toward {}: {}", idx, ag.target_ref, status);
            apply_move_event(ag, idx, MoveRequestEvent::PathFailed);
            return;
        }
    };
    let (_, status) = navquery.update_sliced_find_path(&mut search, MAX_QUICK_SEARCH_ITER);
    let result = if status.is_failure() {
        Err(status)
    } else if ag.target_replan {
        // Try to use existing steady path during replan if possible
        navquery.finalize_sliced_find_path_partial(&mut search, &path, MAX_QUICK_SEARCH_RES)
    } else {
        // Try to move towards target when goal changes
        navquery.finalize_sliced_find_path(&mut search, MAX_QUICK_SEARCH_RES)
    };

    let mut req_path = result.map(|r| r.path).unwrap_or_default();
    let mut req_pos = ag.target_pos;
    if let Some(&last) = req_path.last() {
        if last != ag.target_ref {
            // Partial path, constrain target position inside the last polygon
            match navquery.closest_point_on_poly(last, &ag.target_pos) {
                Ok((nearest, _)) => req_pos = nearest,
                Err(_) => req_path.clear(),
            }
        }
    }

    if req_path.is_empty() {
        // Could not find path, start the request from current location
        req_pos = ag.npos;
        req_path.push(first);
    }

    ag.corridor.set_corridor(&req_pos, &req_path, navquery);
    ag.boundary.reset();
    ag.partial = false;

    if req_path.last() == Some(&ag.target_ref) {
        ag.target_replan_time = 0.0;
        apply_move_event(ag, idx, MoveRequestEvent::PathFound);
    } else {
        // The path is longer or potentially unreachable, full plan
        apply_move_event(ag, idx, MoveRequestEvent::NeedsQueue);
    }
}

/// Joins a queued search result to the corridor the agent walked meanwhile.
///
/// The search started at the last corridor polygon. Returns false when the
/// result does not connect.
fn apply_path_result<Q: NavMeshQuery>(ag: &mut CrowdAgent, res: Vec<PolyRef>, max_path: usize, navquery: &Q) -> bool {
    let path = ag.corridor.get_path();
    if res.is_empty() || path.last() != res.first() {
        return false;
    }

    let mut merged: Vec<PolyRef> = path[..path.len() - 1].to_vec();
    merged.extend(res);
    merged.truncate(max_path);

    // Remove trackbacks
    let mut j = 1;
    while j + 1 < merged.len() {
        if merged[j - 1] == merged[j + 1] {
            merged.drain(j - 1..j + 1);
            j = (j - 1).max(1);
        } else {
            j += 1;
        }
    }

    let Some(&last) = merged.last() else {
        return false;
    };
    let mut target_pos = ag.target_pos;
    if last != ag.target_ref {
        // Partial path, constrain target position inside the last polygon
        match navquery.closest_point_on_poly(last, &target_pos) {
            Ok((nearest, _)) => target_pos = nearest,
            Err(_) => return false,
        }
    }

    ag.corridor.set_corridor(&target_pos, &merged, navquery);
    ag.boundary.reset();
    true
}

fn find_neighbours(
    skip: usize,
    pos: &[f32; 3],
    height: f32,
    range: f32,
    snapshot: &[AgentSnapshot],
    grid: &ProximityGrid,
) -> Vec<CrowdNeighbour> {
    let mut result: Vec<CrowdNeighbour> = Vec::with_capacity(MAX_NEIGHBOURS + 1);

    for id in grid.query_items(pos[0] - range, pos[2] - range, pos[0] + range, pos[2] + range) {
        if id == skip {
            continue;
        }
        let Some(other) = snapshot.get(id) else {
            continue;
        };

        // Check for overlap
        let diff = vsub(pos, &other.pos);
        if diff[1].abs() >= (height + other.height) / 2.0 {
            continue;
        }
        let dist = sqr(diff[0]) + sqr(diff[2]);
        if dist > sqr(range) {
            continue;
        }

        let at = result.partition_point(|n| n.dist <= dist);
        if at >= MAX_NEIGHBOURS {
            continue;
        }
        result.insert(at, CrowdNeighbour { idx: id, dist });
        result.truncate(MAX_NEIGHBOURS);
    }

    result
}

fn calc_smooth_steer_direction(ag: &CrowdAgent) -> [f32; 3] {
    if ag.corners.is_empty() {
        return [0.0; 3];
    }

    let p0 = &ag.corners[0].pos;
    let p1 = &ag.corners[1.min(ag.corners.len() - 1)].pos;

    let mut dir0 = vsub(p0, &ag.npos);
    let mut dir1 = vsub(p1, &ag.npos);
    dir0[1] = 0.0;
    dir1[1] = 0.0;

    let len0 = vlen(&dir0);
    let len1 = vlen(&dir1);
    if len1 > 0.001 {
        dir1 = vscale(&dir1, 1.0 / len1);
    }

    let dir = [dir0[0] - dir1[0] * len0 * 0.5, 0.0, dir0[2] - dir1[2] * len0 * 0.5];
    vnormalize(&dir)
}

fn calc_straight_steer_direction(ag: &CrowdAgent) -> [f32; 3] {
    let Some(corner) = ag.corners.first() else {
        return [0.0; 3];
    };
    let mut dir = vsub(&corner.pos, &ag.npos);
    dir[1] = 0.0;
    vnormalize(&dir)
}

/// Planar distance to the path end when it is among the corners, else `range`
fn get_distance_to_goal(ag: &CrowdAgent, range: f32) -> f32 {
    match ag.corners.last() {
        Some(last) if last.flags & StraightPathFlags::END != 0 => vdist_2d(&ag.npos, &last.pos).min(range),
        _ => range,
    }
}

fn apply_separation(ag: &CrowdAgent, mut dvel: [f32; 3], snapshot: &[AgentSnapshot]) -> [f32; 3] {
    let separation_dist = ag.params.collision_query_range;
    let inv_separation_dist = 1.0 / separation_dist;
    let separation_weight = ag.params.separation_weight;

    let mut w = 0.0;
    let mut disp = [0.0; 3];

    for nei in &ag.neis {
        let Some(other) = snapshot.get(nei.idx) else {
            continue;
        };
        let mut diff = vsub(&ag.npos, &other.pos);
        diff[1] = 0.0;

        let dist_sqr = vlen_sqr(&diff);
        if dist_sqr < 0.00001 || dist_sqr > sqr(separation_dist) {
            continue;
        }
        let dist = dist_sqr.sqrt();
        let weight = separation_weight * (1.0 - sqr(dist * inv_separation_dist));

        disp = vmad(&disp, &diff, weight / dist);
        w += 1.0;
    }

    if w > 0.0001 {
        // Adjust desired velocity
        dvel = vmad(&dvel, &disp, 1.0 / w);
        // Clamp desired velocity to desired speed
        let speed_sqr = vlen_sqr(&dvel);
        let desired_sqr = sqr(ag.desired_speed);
        if speed_sqr > desired_sqr && speed_sqr > 0.0 {
            dvel = vscale(&dvel, (desired_sqr / speed_sqr).sqrt());
        }
    }

    dvel
}

/// Chooses the new velocity of one agent. Returns the samples taken.
fn plan_velocity(
    ag: &mut CrowdAgent,
    snapshot: &[AgentSnapshot],
    query: &mut ObstacleAvoidanceQuery,
    obstacle_params: &[ObstacleAvoidanceParams; MAX_AVOIDANCE_PARAMS],
    vod: Option<&mut ObstacleAvoidanceDebugData>,
) -> usize {
    if !ag.params.update_flags.contains(UpdateFlags::OBSTACLE_AVOIDANCE) {
        // Without velocity planning the new velocity is the desired one
        ag.nvel = ag.dvel;
        return 0;
    }

    query.reset();

    // Add neighbours as obstacles
    for nei in &ag.neis {
        if let Some(other) = snapshot.get(nei.idx) {
            query.add_circle(&other.pos, other.radius, &other.vel, &other.dvel);
        }
    }

    // Append neighbour segments as obstacles
    for j in 0..ag.boundary.get_segment_count() {
        let Some(s) = ag.boundary.get_segment(j) else {
            continue;
        };
        let p = [s[0], s[1], s[2]];
        let q = [s[3], s[4], s[5]];
        // Skip walls the agent is behind
        if tri_area_2d(&ag.npos, &p, &q) < 0.0 {
            continue;
        }
        query.add_segment(&p, &q);
    }

    let params = &obstacle_params[ag.params.obstacle_avoidance_type as usize];
    let (nvel, ns) =
        query.sample_velocity_adaptive(&ag.npos, ag.params.radius, ag.desired_speed, &ag.vel, &ag.dvel, params, vod);
    ag.nvel = nvel;
    ns
}

fn integrate(ag: &mut CrowdAgent, dt: f32) {
    // Fake dynamic constraint
    let max_delta = ag.params.max_acceleration * dt;
    let mut dv = vsub(&ag.nvel, &ag.vel);
    let ds = vlen(&dv);
    if ds > max_delta && ds > 0.0 {
        dv = vscale(&dv, max_delta / ds);
    }
    ag.vel = vadd(&ag.vel, &dv);

    // Integrate
    if vlen(&ag.vel) > 0.0001 {
        ag.npos = vmad(&ag.npos, &ag.vel, dt);
    } else {
        ag.vel = [0.0; 3];
    }
}

fn tween(t: f32, t0: f32, t1: f32) -> f32 {
    if t1 - t0 <= 0.0 {
        return 1.0;
    }
    ((t - t0) / (t1 - t0)).clamp(0.0, 1.0)
}
