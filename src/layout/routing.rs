use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::debug;

use crate::config::RouterConfig;
use crate::graph::{Graph, Point, Rect, traverse_graph};

// ── A* cost scaling ─────────────────────────────────────────────────
/// Integer cost multiplier so A* can use u32 costs with fractional cell sizes.
const ASTAR_COST_SCALE: f32 = 1000.0;
/// Smallest cell size accepted from configuration.
const ROUTING_CELL_MIN: f32 = 0.25;
/// Direction slot for the start state, which has no incoming move.
const NO_DIR: u8 = 4;
const DIR_SLOTS: usize = 5;
const DIRS: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// Routes a polyline from `start` to `end` around `obstacles`.
///
/// The direct segment is returned when it clears every obstacle (expanded by
/// the configured clearance), and also when the grid search fails or runs out
/// of budget.
pub fn route_edge(start: Point, end: Point, obstacles: &[Rect], config: &RouterConfig) -> Vec<Point> {
    let expanded: Vec<Rect> = obstacles
        .iter()
        .map(|rect| rect.expand(config.clearance.max(0.0)))
        .collect();
    let direct = vec![start, end];
    if !expanded
        .iter()
        .any(|rect| segment_intersects_rect(start, end, rect))
    {
        return direct;
    }

    let Some(grid) = RoutingGrid::new(start, end, &expanded, config) else {
        debug!(
            max_cells = config.max_cells,
            "routing grid over budget, using straight segment"
        );
        return direct;
    };
    match route_with_grid(&grid, start, end, config) {
        Some(points) => points,
        None => {
            debug!(
                start_x = start.x,
                start_y = start.y,
                end_x = end.x,
                end_y = end.y,
                "no route within budget, using straight segment"
            );
            direct
        }
    }
}

/// Reroutes every edge of a laid-out graph around the boxes of the nodes it
/// does not connect. The source, the target and the groups enclosing either
/// are not obstacles for that edge.
pub fn route_graph_edges<N, E>(graph: &mut Graph<N, E>, config: &RouterConfig) {
    let rects = graph.absolute_rects();
    let parents = graph.parent_map();
    let mut boxes: Vec<(String, Rect)> = Vec::new();
    traverse_graph(graph, |node, _, _| {
        if let Some(rect) = rects.get(&node.id) {
            boxes.push((node.id.clone(), *rect));
        }
    });

    for edge in graph.edges.iter_mut() {
        let (Some(from), Some(to)) = (rects.get(&edge.source), rects.get(&edge.target)) else {
            continue;
        };
        if edge.source == edge.target {
            continue;
        }
        let mut exempt: HashSet<&str> = HashSet::new();
        for endpoint in [edge.source.as_str(), edge.target.as_str()] {
            exempt.insert(endpoint);
            exempt.extend(ancestors(&parents, endpoint));
        }
        let obstacles: Vec<Rect> = boxes
            .iter()
            .filter(|(id, _)| !exempt.contains(id.as_str()))
            .map(|(_, rect)| *rect)
            .collect();
        let start = edge.points.first().copied().unwrap_or_else(|| from.center());
        let end = edge.points.last().copied().unwrap_or_else(|| to.center());
        edge.points = route_edge(start, end, &obstacles, config);
    }
}

fn ancestors<'a>(parents: &'a HashMap<String, String>, id: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut current = parents.get(id);
    while let Some(parent) = current {
        out.push(parent.as_str());
        current = parents.get(parent);
    }
    out
}

#[derive(Debug, Clone)]
struct RoutingGrid {
    cell: f32,
    min_x: f32,
    min_y: f32,
    cols: i32,
    rows: i32,
    blocked: Vec<bool>,
}

impl RoutingGrid {
    fn new(start: Point, end: Point, obstacles: &[Rect], config: &RouterConfig) -> Option<Self> {
        let cell = config.cell_size.max(ROUTING_CELL_MIN);
        let mut min_x = start.x.min(end.x);
        let mut min_y = start.y.min(end.y);
        let mut max_x = start.x.max(end.x);
        let mut max_y = start.y.max(end.y);
        for obs in obstacles {
            min_x = min_x.min(obs.x);
            min_y = min_y.min(obs.y);
            max_x = max_x.max(obs.right());
            max_y = max_y.max(obs.bottom());
        }
        let margin = cell * config.padding_cells as f32;
        min_x -= margin;
        min_y -= margin;
        max_x += margin;
        max_y += margin;
        let cols = ((max_x - min_x) / cell).ceil() as i32 + 1;
        let rows = ((max_y - min_y) / cell).ceil() as i32 + 1;
        if cols <= 1 || rows <= 1 {
            return None;
        }
        let total_cells = (cols as usize).saturating_mul(rows as usize);
        if total_cells > config.max_cells {
            return None;
        }

        let mut blocked = vec![false; total_cells];
        for obs in obstacles {
            let start_x = ((obs.x - min_x) / cell).floor().max(0.0) as i32;
            let end_x = ((obs.right() - min_x) / cell)
                .floor()
                .min((cols - 1) as f32) as i32;
            let start_y = ((obs.y - min_y) / cell).floor().max(0.0) as i32;
            let end_y = ((obs.bottom() - min_y) / cell)
                .floor()
                .min((rows - 1) as f32) as i32;
            for iy in start_y..=end_y {
                for ix in start_x..=end_x {
                    let bounds = Rect::new(
                        min_x + ix as f32 * cell,
                        min_y + iy as f32 * cell,
                        cell,
                        cell,
                    );
                    if bounds.overlaps(obs) {
                        blocked[(iy * cols + ix) as usize] = true;
                    }
                }
            }
        }

        Some(Self {
            cell,
            min_x,
            min_y,
            cols,
            rows,
            blocked,
        })
    }

    fn index(&self, ix: i32, iy: i32) -> usize {
        (iy * self.cols + ix) as usize
    }

    fn cell_for_point(&self, point: Point) -> Option<(i32, i32)> {
        let ix = ((point.x - self.min_x) / self.cell).floor() as i32;
        let iy = ((point.y - self.min_y) / self.cell).floor() as i32;
        if ix < 0 || iy < 0 || ix >= self.cols || iy >= self.rows {
            return None;
        }
        Some((ix, iy))
    }

    fn cell_center(&self, ix: i32, iy: i32) -> Point {
        Point::new(
            self.min_x + (ix as f32 + 0.5) * self.cell,
            self.min_y + (iy as f32 + 0.5) * self.cell,
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct GridState {
    x: i32,
    y: i32,
    dir: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct GridEntry {
    est: u32,
    cost: u32,
    seq: u64,
    state: GridState,
}

// Min-heap on the estimate; among equal estimates the entry pushed first wins.
impl Ord for GridEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .est
            .cmp(&self.est)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for GridEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn route_with_grid(
    grid: &RoutingGrid,
    start: Point,
    end: Point,
    config: &RouterConfig,
) -> Option<Vec<Point>> {
    let (start_ix, start_iy) = grid.cell_for_point(start)?;
    let (end_ix, end_iy) = grid.cell_for_point(end)?;
    if start_ix == end_ix && start_iy == end_iy {
        return Some(vec![start, end]);
    }

    let cols = grid.cols;
    let rows = grid.rows;
    let step_cost = (grid.cell * ASTAR_COST_SCALE).round().max(1.0) as u32;
    let turn_penalty = (config.turn_penalty.max(0.0) * grid.cell * ASTAR_COST_SCALE).round() as u32;
    let state_index =
        |s: GridState| grid.index(s.x, s.y) * DIR_SLOTS + s.dir as usize;

    let states = (cols * rows) as usize * DIR_SLOTS;
    let mut best_cost = vec![u32::MAX; states];
    let mut prev: Vec<Option<GridState>> = vec![None; states];
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;

    let origin = GridState {
        x: start_ix,
        y: start_iy,
        dir: NO_DIR,
    };
    best_cost[state_index(origin)] = 0;
    heap.push(GridEntry {
        est: 0,
        cost: 0,
        seq,
        state: origin,
    });

    let mut end_state: Option<GridState> = None;
    let mut steps = 0usize;

    while let Some(entry) = heap.pop() {
        steps += 1;
        if steps > config.max_steps {
            break;
        }
        let GridEntry { cost, state, .. } = entry;
        if cost != best_cost[state_index(state)] {
            continue;
        }
        if state.x == end_ix && state.y == end_iy {
            end_state = Some(state);
            break;
        }
        for (dir_idx, (dx, dy)) in DIRS.iter().enumerate() {
            let nx = state.x + dx;
            let ny = state.y + dy;
            if nx < 0 || ny < 0 || nx >= cols || ny >= rows {
                continue;
            }
            let is_endpoint = (nx == end_ix && ny == end_iy) || (nx == start_ix && ny == start_iy);
            if !is_endpoint && grid.blocked[grid.index(nx, ny)] {
                continue;
            }
            let mut next_cost = cost.saturating_add(step_cost);
            if state.dir != NO_DIR && state.dir != dir_idx as u8 {
                next_cost = next_cost.saturating_add(turn_penalty);
            }
            let next = GridState {
                x: nx,
                y: ny,
                dir: dir_idx as u8,
            };
            let next_idx = state_index(next);
            if next_cost >= best_cost[next_idx] {
                continue;
            }
            best_cost[next_idx] = next_cost;
            prev[next_idx] = Some(state);
            let manhattan = (nx - end_ix).unsigned_abs() + (ny - end_iy).unsigned_abs();
            seq += 1;
            heap.push(GridEntry {
                est: next_cost.saturating_add(manhattan.saturating_mul(step_cost)),
                cost: next_cost,
                seq,
                state: next,
            });
        }
    }

    let mut cur = end_state?;
    let mut cells: Vec<(i32, i32)> = Vec::new();
    loop {
        cells.push((cur.x, cur.y));
        match prev[state_index(cur)] {
            Some(prev_state) => cur = prev_state,
            None => break,
        }
    }
    cells.reverse();

    // The endpoint cells may straddle an obstacle border, so only interior
    // cell centers become vertices.
    let mut points = Vec::with_capacity(cells.len() + 2);
    points.push(start);
    if cells.len() > 2 {
        for &(ix, iy) in &cells[1..cells.len() - 1] {
            points.push(grid.cell_center(ix, iy));
        }
    }
    points.push(end);
    Some(simplify_path(&points))
}

/// Drops repeated points and interior points lying on the segment between
/// their neighbours.
pub fn simplify_path(points: &[Point]) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    out.push(points[0]);
    for idx in 1..points.len() - 1 {
        let prev = out[out.len() - 1];
        let curr = points[idx];
        let next = points[idx + 1];
        if prev.distance(curr) <= 1e-4 {
            continue;
        }
        let cross = (curr.x - prev.x) * (next.y - curr.y) - (curr.y - prev.y) * (next.x - curr.x);
        let dot = (curr.x - prev.x) * (next.x - curr.x) + (curr.y - prev.y) * (next.y - curr.y);
        if cross.abs() <= 1e-3 && dot >= 0.0 {
            continue;
        }
        out.push(curr);
    }
    let last = points[points.len() - 1];
    if out[out.len() - 1].distance(last) > 1e-4 || out.len() == 1 {
        out.push(last);
    }
    out
}

pub fn segment_intersects_rect(a: Point, b: Point, rect: &Rect) -> bool {
    let min_x = a.x.min(b.x);
    let max_x = a.x.max(b.x);
    let min_y = a.y.min(b.y);
    let max_y = a.y.max(b.y);
    if max_x < rect.x || min_x > rect.right() || max_y < rect.y || min_y > rect.bottom() {
        return false;
    }
    let inside = |p: Point| p.x >= rect.x && p.x <= rect.right() && p.y >= rect.y && p.y <= rect.bottom();
    if inside(a) || inside(b) {
        return true;
    }
    let corners = [
        Point::new(rect.x, rect.y),
        Point::new(rect.right(), rect.y),
        Point::new(rect.right(), rect.bottom()),
        Point::new(rect.x, rect.bottom()),
    ];
    (0..4).any(|i| segments_intersect(a, b, corners[i], corners[(i + 1) % 4]))
}

fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    fn orient(a: Point, b: Point, c: Point) -> f32 {
        (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
    }
    fn on_segment(a: Point, b: Point, c: Point) -> bool {
        c.x >= a.x.min(b.x) - 1e-6
            && c.x <= a.x.max(b.x) + 1e-6
            && c.y >= a.y.min(b.y) - 1e-6
            && c.y <= a.y.max(b.y) + 1e-6
    }
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    if (o1 > 0.0 && o2 < 0.0 || o1 < 0.0 && o2 > 0.0)
        && (o3 > 0.0 && o4 < 0.0 || o3 < 0.0 && o4 > 0.0)
    {
        return true;
    }
    (o1.abs() <= 1e-6 && on_segment(a, b, c))
        || (o2.abs() <= 1e-6 && on_segment(a, b, d))
        || (o3.abs() <= 1e-6 && on_segment(c, d, a))
        || (o4.abs() <= 1e-6 && on_segment(c, d, b))
}
