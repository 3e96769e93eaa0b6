//! Sampled velocity-obstacle avoidance
//!
//! Candidate velocities are scored against nearby moving circles (other
//! agents) and static segments (walls). The score combines deviation from the
//! desired and current velocities, a side bias that keeps agents passing on
//! a consistent side, and the time to the first impact within a time horizon.
//! Two sampling strategies are provided: a regular grid over the velocity
//! disc, and an adaptive pattern of rings aligned with the desired velocity
//! that is refined around the best sample several times.

use navcrowd_common::{sqr, tri_area_2d, vdist_2d, vdot_2d, vnormalize, vperp_2d, vsub};
use serde::{Deserialize, Serialize};

/// Maximum number of divisions of the adaptive pattern
pub const MAX_PATTERN_DIVS: usize = 32;
/// Maximum number of rings of the adaptive pattern
pub const MAX_PATTERN_RINGS: usize = 4;

/// A moving circular obstacle
#[derive(Debug, Clone, Copy, Default)]
pub struct ObstacleCircle {
    /// Position of the obstacle
    pub p: [f32; 3],
    /// Velocity of the obstacle
    pub vel: [f32; 3],
    /// Desired velocity of the obstacle
    pub dvel: [f32; 3],
    /// Radius of the obstacle
    pub rad: f32,
    /// Direction toward the obstacle, used for side selection
    pub dp: [f32; 3],
    /// Preferred passing side normal, used for side selection
    pub np: [f32; 3],
}

/// A static segment obstacle
#[derive(Debug, Clone, Copy, Default)]
pub struct ObstacleSegment {
    /// Start point of the obstacle segment
    pub p: [f32; 3],
    /// End point of the obstacle segment
    pub q: [f32; 3],
    /// The agent touches the segment
    pub touch: bool,
}

/// Tuning parameters of the avoidance sampler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleAvoidanceParams {
    /// Fraction of the desired velocity the sampling pattern is centred on
    pub vel_bias: f32,
    /// Weight of deviating from the desired velocity
    pub weight_des_vel: f32,
    /// Weight of deviating from the current velocity
    pub weight_cur_vel: f32,
    /// Weight of passing obstacles on the wrong side
    pub weight_side: f32,
    /// Weight of the time of impact
    pub weight_toi: f32,
    /// Time horizon of impact checks, in seconds
    pub horiz_time: f32,
    /// Samples per side of the grid sampler
    pub grid_size: u8,
    /// Angular divisions of the adaptive pattern
    pub adaptive_divs: u8,
    /// Rings of the adaptive pattern
    pub adaptive_rings: u8,
    /// Refinement passes of the adaptive sampler
    pub adaptive_depth: u8,
}

impl Default for ObstacleAvoidanceParams {
    fn default() -> Self {
        Self {
            vel_bias: 0.4,
            weight_des_vel: 2.0,
            weight_cur_vel: 0.75,
            weight_side: 0.75,
            weight_toi: 2.5,
            horiz_time: 2.5,
            grid_size: 33,
            adaptive_divs: 7,
            adaptive_rings: 2,
            adaptive_depth: 5,
        }
    }
}

/// A scored candidate velocity recorded for debugging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleAvoidanceSample {
    pub vel: [f32; 3],
    pub size: f32,
    pub pen: f32,
    pub vpen: f32,
    pub vcpen: f32,
    pub spen: f32,
    pub tpen: f32,
}

/// Recorder of every sample evaluated by one sampler call
#[derive(Debug, Clone, Default)]
pub struct ObstacleAvoidanceDebugData {
    samples: Vec<ObstacleAvoidanceSample>,
    max_samples: usize,
}

impl ObstacleAvoidanceDebugData {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_sample(&mut self, vel: &[f32; 3], size: f32, pen: f32, vpen: f32, vcpen: f32, spen: f32, tpen: f32) {
        if self.samples.len() >= self.max_samples {
            return;
        }
        self.samples.push(ObstacleAvoidanceSample {
            vel: *vel,
            size,
            pen,
            vpen,
            vcpen,
            spen,
            tpen,
        });
    }

    /// Rescales every penalty series to the `[0, 1]` range
    pub fn normalize_samples(&mut self) {
        normalize_series(&mut self.samples, |s| &mut s.pen);
        normalize_series(&mut self.samples, |s| &mut s.vpen);
        normalize_series(&mut self.samples, |s| &mut s.vcpen);
        normalize_series(&mut self.samples, |s| &mut s.spen);
        normalize_series(&mut self.samples, |s| &mut s.tpen);
    }

    pub fn get_sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn get_sample(&self, i: usize) -> Option<&ObstacleAvoidanceSample> {
        self.samples.get(i)
    }

    pub fn samples(&self) -> &[ObstacleAvoidanceSample] {
        &self.samples
    }
}

fn normalize_series(samples: &mut [ObstacleAvoidanceSample], field: impl Fn(&mut ObstacleAvoidanceSample) -> &mut f32) {
    if samples.is_empty() {
        return;
    }
    let mut min_pen = f32::MAX;
    let mut max_pen = f32::MIN;
    for s in samples.iter_mut() {
        let v = *field(s);
        min_pen = min_pen.min(v);
        max_pen = max_pen.max(v);
    }
    let range = max_pen - min_pen;
    let scale = if range > 0.001 { 1.0 / range } else { 1.0 };
    for s in samples.iter_mut() {
        let v = field(s);
        *v = ((*v - min_pen) * scale).clamp(0.0, 1.0);
    }
}

/// Sweeps circle `c0` moving with `v` against static circle `c1`.
///
/// Returns the entry and exit times, `None` when they never touch.
fn sweep_circle_circle(c0: &[f32; 3], r0: f32, v: &[f32; 3], c1: &[f32; 3], r1: f32) -> Option<(f32, f32)> {
    const EPS: f32 = 0.0001;
    let s = vsub(c1, c0);
    let r = r0 + r1;
    let c = vdot_2d(&s, &s) - r * r;
    let a = vdot_2d(v, v);
    // Not moving
    if a < EPS {
        return None;
    }
    let b = vdot_2d(v, &s);
    let d = b * b - a * c;
    if d < 0.0 {
        return None;
    }
    let a = 1.0 / a;
    let rd = d.sqrt();
    Some(((b - rd) * a, (b + rd) * a))
}

/// Intersects the ray `ap + t * u` with segment `bp -> bq`
fn isect_ray_seg(ap: &[f32; 3], u: &[f32; 3], bp: &[f32; 3], bq: &[f32; 3]) -> Option<f32> {
    let v = vsub(bq, bp);
    let w = vsub(ap, bp);
    let d = vperp_2d(u, &v);
    if d.abs() < 1e-6 {
        return None;
    }
    let d = 1.0 / d;
    let t = vperp_2d(&v, &w) * d;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let s = vperp_2d(u, &w) * d;
    if !(0.0..=1.0).contains(&s) {
        return None;
    }
    Some(t)
}

fn normalize_2d(v: &mut [f32; 3]) {
    let d = (v[0] * v[0] + v[2] * v[2]).sqrt();
    if d == 0.0 {
        return;
    }
    v[0] /= d;
    v[2] /= d;
}

fn rotate_2d(v: &[f32; 3], ang: f32) -> [f32; 3] {
    let (s, c) = ang.sin_cos();
    [v[0] * c - v[2] * s, v[1], v[0] * s + v[2] * c]
}

/// Per-call state of one sampler evaluation
struct SampleContext<'a> {
    pos: &'a [f32; 3],
    rad: f32,
    vel: &'a [f32; 3],
    dvel: &'a [f32; 3],
}

/// Velocity sampler with its obstacle set
#[derive(Debug, Clone)]
pub struct ObstacleAvoidanceQuery {
    params: ObstacleAvoidanceParams,
    inv_horiz_time: f32,
    inv_vmax: f32,

    max_circles: usize,
    circles: Vec<ObstacleCircle>,
    max_segments: usize,
    segments: Vec<ObstacleSegment>,
}

impl ObstacleAvoidanceQuery {
    pub fn new(max_circles: usize, max_segments: usize) -> Self {
        Self {
            params: ObstacleAvoidanceParams::default(),
            inv_horiz_time: 0.0,
            inv_vmax: 0.0,
            max_circles,
            circles: Vec::with_capacity(max_circles),
            max_segments,
            segments: Vec::with_capacity(max_segments),
        }
    }

    /// Removes all obstacles
    pub fn reset(&mut self) {
        self.circles.clear();
        self.segments.clear();
    }

    pub fn add_circle(&mut self, pos: &[f32; 3], rad: f32, vel: &[f32; 3], dvel: &[f32; 3]) {
        if self.circles.len() >= self.max_circles {
            return;
        }
        self.circles.push(ObstacleCircle {
            p: *pos,
            vel: *vel,
            dvel: *dvel,
            rad,
            ..Default::default()
        });
    }

    pub fn add_segment(&mut self, p: &[f32; 3], q: &[f32; 3]) {
        if self.segments.len() >= self.max_segments {
            return;
        }
        self.segments.push(ObstacleSegment {
            p: *p,
            q: *q,
            touch: false,
        });
    }

    pub fn get_obstacle_circle_count(&self) -> usize {
        self.circles.len()
    }

    pub fn get_obstacle_circle(&self, i: usize) -> Option<&ObstacleCircle> {
        self.circles.get(i)
    }

    pub fn get_obstacle_segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn get_obstacle_segment(&self, i: usize) -> Option<&ObstacleSegment> {
        self.segments.get(i)
    }

    fn prepare(&mut self, pos: &[f32; 3], dvel: &[f32; 3]) {
        // Prepare obstacles
        for cir in self.circles.iter_mut() {
            // Side
            let orig = [0.0; 3];
            cir.dp = vnormalize(&vsub(&cir.p, pos));
            let dv = vsub(&cir.dvel, dvel);

            let a = tri_area_2d(&orig, &cir.dp, &dv);
            cir.np = if a < 0.01 {
                [-cir.dp[2], 0.0, cir.dp[0]]
            } else {
                [cir.dp[2], 0.0, -cir.dp[0]]
            };
        }

        for seg in self.segments.iter_mut() {
            // Precalc if the agent is really close to the segment
            let r = 0.01;
            let (d, _) = navcrowd_common::dist_pt_seg_sqr_2d(pos, &seg.p, &seg.q);
            seg.touch = d < sqr(r);
        }
    }

    fn begin(&mut self, ctx: &SampleContext, vmax: f32, params: &ObstacleAvoidanceParams) {
        self.prepare(ctx.pos, ctx.dvel);
        self.params = *params;
        self.inv_horiz_time = 1.0 / params.horiz_time;
        self.inv_vmax = if vmax > 0.0 { 1.0 / vmax } else { f32::MAX };
    }

    /// Scores `vcand`. Gives up early, returning `min_penalty`, once the
    /// candidate can no longer beat it.
    fn process_sample(
        &self,
        vcand: &[f32; 3],
        cs: f32,
        ctx: &SampleContext,
        min_penalty: f32,
        debug: Option<&mut ObstacleAvoidanceDebugData>,
    ) -> f32 {
        let p = &self.params;

        // Penalty for straying away from the desired and current velocities
        let vpen = p.weight_des_vel * (vdist_2d(vcand, ctx.dvel) * self.inv_vmax);
        let vcpen = p.weight_cur_vel * (vdist_2d(vcand, ctx.vel) * self.inv_vmax);

        // Hit time below which the sample cannot beat the best one
        let min_pen = min_penalty - vpen - vcpen;
        let t_threshold = (p.weight_toi / min_pen - 0.1) * p.horiz_time;
        if t_threshold - p.horiz_time > -f32::EPSILON {
            return min_penalty;
        }

        // Find min time of impact and exit amongst all obstacles
        let mut tmin = p.horiz_time;
        let mut side = 0.0;
        let mut nside = 0;

        for cir in &self.circles {
            // RVO
            let vab = [
                vcand[0] * 2.0 - ctx.vel[0] - cir.vel[0],
                0.0,
                vcand[2] * 2.0 - ctx.vel[2] - cir.vel[2],
            ];

            // Side
            side += (vdot_2d(&cir.dp, &vab) * 0.5 + 0.5)
                .min(vdot_2d(&cir.np, &vab) * 2.0)
                .clamp(0.0, 1.0);
            nside += 1;

            let Some((mut htmin, htmax)) = sweep_circle_circle(ctx.pos, ctx.rad, &vab, &cir.p, cir.rad) else {
                continue;
            };

            // Handle overlapping obstacles
            if htmin < 0.0 && htmax > 0.0 {
                // Avoid more when overlapped
                htmin = -htmin * 0.5;
            }

            if htmin >= 0.0 && htmin < tmin {
                // The closest obstacle is somewhere ahead of us
                tmin = htmin;
                if tmin < t_threshold {
                    return min_penalty;
                }
            }
        }

        for seg in &self.segments {
            let htmin = if seg.touch {
                // Special case when the agent is very close to the segment
                let sdir = vsub(&seg.q, &seg.p);
                let snorm = [-sdir[2], 0.0, sdir[0]];
                // If the velocity is pointing away from the segment, no collision
                if vdot_2d(&snorm, vcand) < 0.0 {
                    continue;
                }
                // Else immediate collision
                0.0
            } else {
                match isect_ray_seg(ctx.pos, vcand, &seg.p, &seg.q) {
                    Some(t) => t,
                    None => continue,
                }
            };

            // Avoid less when facing walls
            let htmin = htmin * 2.0;

            if htmin < tmin {
                tmin = htmin;
                if tmin < t_threshold {
                    return min_penalty;
                }
            }
        }

        // Normalize side bias, to prevent it dominating too much
        if nside > 0 {
            side /= nside as f32;
        }

        let spen = p.weight_side * side;
        let tpen = p.weight_toi * (1.0 / (0.1 + tmin * self.inv_horiz_time));

        let penalty = vpen + vcpen + spen + tpen;

        if let Some(debug) = debug {
            debug.add_sample(vcand, cs, penalty, vpen, vcpen, spen, tpen);
        }

        penalty
    }

    /// Samples a regular grid of velocities centred on the biased desired
    /// velocity. Returns the chosen velocity and the number of samples taken.
    #[allow(clippy::too_many_arguments)]
    pub fn sample_velocity_grid(
        &mut self,
        pos: &[f32; 3],
        rad: f32,
        vmax: f32,
        vel: &[f32; 3],
        dvel: &[f32; 3],
        params: &ObstacleAvoidanceParams,
        mut debug: Option<&mut ObstacleAvoidanceDebugData>,
    ) -> ([f32; 3], usize) {
        let ctx = SampleContext { pos, rad, vel, dvel };
        self.begin(&ctx, vmax, params);

        if let Some(debug) = debug.as_deref_mut() {
            debug.reset();
        }

        let mut nvel = [0.0; 3];
        let grid_size = params.grid_size.max(2) as f32;
        let cvx = dvel[0] * params.vel_bias;
        let cvz = dvel[2] * params.vel_bias;
        let cs = vmax * 2.0 * (1.0 - params.vel_bias) / (grid_size - 1.0);
        let half = (grid_size - 1.0) * cs * 0.5;

        let mut min_penalty = f32::MAX;
        let mut ns = 0;

        for y in 0..params.grid_size.max(2) {
            for x in 0..params.grid_size.max(2) {
                let vcand = [cvx + x as f32 * cs - half, 0.0, cvz + y as f32 * cs - half];

                if sqr(vcand[0]) + sqr(vcand[2]) > sqr(vmax + cs / 2.0) {
                    continue;
                }

                let penalty = self.process_sample(&vcand, cs, &ctx, min_penalty, debug.as_deref_mut());
                ns += 1;
                if penalty < min_penalty {
                    min_penalty = penalty;
                    nvel = vcand;
                }
            }
        }

        (nvel, ns)
    }

    /// Samples rings of velocities aligned with the desired velocity, then
    /// repeatedly refines around the best one at half the radius. Returns the
    /// chosen velocity and the number of samples taken.
    #[allow(clippy::too_many_arguments)]
    pub fn sample_velocity_adaptive(
        &mut self,
        pos: &[f32; 3],
        rad: f32,
        vmax: f32,
        vel: &[f32; 3],
        dvel: &[f32; 3],
        params: &ObstacleAvoidanceParams,
        mut debug: Option<&mut ObstacleAvoidanceDebugData>,
    ) -> ([f32; 3], usize) {
        let ctx = SampleContext { pos, rad, vel, dvel };
        self.begin(&ctx, vmax, params);

        if let Some(debug) = debug.as_deref_mut() {
            debug.reset();
        }

        let pattern = build_pattern(dvel, params);

        // Start sampling
        let mut cr = vmax * (1.0 - params.vel_bias);
        let mut res = [dvel[0] * params.vel_bias, 0.0, dvel[2] * params.vel_bias];
        let mut ns = 0;

        for _ in 0..params.adaptive_depth {
            let mut min_penalty = f32::MAX;
            let mut bvel = [0.0; 3];

            for pat in &pattern {
                let vcand = [res[0] + pat[0] * cr, 0.0, res[2] + pat[1] * cr];

                if sqr(vcand[0]) + sqr(vcand[2]) > sqr(vmax + 0.001) {
                    continue;
                }

                let penalty = self.process_sample(&vcand, cr / 10.0, &ctx, min_penalty, debug.as_deref_mut());
                ns += 1;
                if penalty < min_penalty {
                    min_penalty = penalty;
                    bvel = vcand;
                }
            }

            res = bvel;
            cr *= 0.5;
        }

        (res, ns)
    }
}

impl Default for ObstacleAvoidanceQuery {
    fn default() -> Self {
        Self::new(6, 8)
    }
}

/// Unit-disc sampling pattern: the origin plus rings of points alternating
/// around the desired direction
fn build_pattern(dvel: &[f32; 3], params: &ObstacleAvoidanceParams) -> Vec<[f32; 2]> {
    let nd = (params.adaptive_divs as usize).clamp(1, MAX_PATTERN_DIVS);
    let nr = (params.adaptive_rings as usize).clamp(1, MAX_PATTERN_RINGS);
    let da = (1.0 / nd as f32) * std::f32::consts::PI * 2.0;
    let (sa, ca) = da.sin_cos();

    // Desired direction, and the same rotated by half a division
    let mut ddir0 = *dvel;
    normalize_2d(&mut ddir0);
    let ddir1 = rotate_2d(&ddir0, da * 0.5);
    let ddirs = [ddir0, ddir1];

    let mut pat = Vec::with_capacity(nd * nr + 1);
    // Always add sample at zero
    pat.push([0.0, 0.0]);

    for j in 0..nr {
        let r = (nr - j) as f32 / nr as f32;
        let d = &ddirs[j % 2];
        let first = [d[0] * r, d[2] * r];
        pat.push(first);

        let mut last1 = first;
        let mut last2 = first;
        let mut i = 1;
        while i + 1 < nd {
            // Next point on the right (rotate CW) and on the left (rotate CCW)
            let right = [last1[0] * ca + last1[1] * sa, -last1[0] * sa + last1[1] * ca];
            let left = [last2[0] * ca - last2[1] * sa, last2[0] * sa + last2[1] * ca];
            pat.push(right);
            pat.push(left);
            last1 = right;
            last2 = left;
            i += 2;
        }

        if nd % 2 == 0 {
            pat.push([last2[0] * ca - last2[1] * sa, last2[0] * sa + last2[1] * ca]);
        }
    }

    pat
}
