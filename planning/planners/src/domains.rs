//! Benchmark domains, built directly as ground problems.

use anyhow::ensure;
use derive_more::derive::Display;
use hashbrown::HashMap;
use itertools::Itertools;
use std::str::FromStr;
use tempo_model::compile::{AllowAll, CombinationFilter, ConvertedProblem, Mode, combine, decompose};
use tempo_model::*;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum Domain {
    #[display("simple")]
    Simple,
    #[display("strips-prob")]
    StripsProb,
    #[display("machine-shop")]
    MachineShop,
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Domain::Simple),
            "strips-prob" => Ok(Domain::StripsProb),
            "machine-shop" => Ok(Domain::MachineShop),
            _ => Err(format!(
                "Unknown domain: '{s}'. Valid options are: 'simple', 'strips-prob', 'machine-shop'"
            )),
        }
    }
}

/// Size parameters of the benchmark instances.
#[derive(Copy, Clone, Debug)]
pub struct Params {
    /// Number of pieces and machines of the machine shop.
    pub objects: usize,
    /// Number of parts of `simple`, number of garbage actions of `strips-prob`.
    pub garbage: usize,
    pub deadline: i64,
}

/// A ground problem with the rule restricting the combinations of its actions.
pub struct Instance {
    pub problem: Problem,
    filter: Box<dyn CombinationFilter>,
}

/// Problems handed to the planner: the one searched and the decomposed one used by the heuristic.
pub struct Compiled {
    pub problem: ConvertedProblem,
    pub heuristic: ConvertedProblem,
}

impl Instance {
    pub fn new(domain: Domain, params: Params, mode: Mode) -> Res<Instance> {
        let instance = match domain {
            Domain::Simple => Instance {
                problem: simple(params.garbage, params.deadline)?,
                filter: Box::new(AllowAll),
            },
            Domain::StripsProb => Instance {
                problem: strips_prob(params.garbage, params.deadline)?,
                filter: Box::new(AllowAll),
            },
            Domain::MachineShop => {
                let (problem, filter) = machine_shop(params.objects, params.deadline, mode)?;
                Instance {
                    problem,
                    filter: Box::new(filter),
                }
            }
        };
        Ok(instance)
    }

    pub fn compile(&self, mode: Mode) -> Compiled {
        match mode {
            Mode::Regular => {
                let problem = decompose(&self.problem);
                Compiled {
                    heuristic: problem.clone(),
                    problem,
                }
            }
            Mode::Combination => {
                let combined = combine(&self.problem, self.filter.as_ref(), false);
                Compiled {
                    problem: combined.problem,
                    heuristic: combined.split,
                }
            }
        }
    }
}

/// `parts` independent actions of duration 4, each achieving one of the goals `got(i)`.
pub fn simple(parts: usize, deadline: i64) -> Res<Problem> {
    let mut world = World::new();
    let got = (0..parts).map(|i| world.intern(&["got".to_string(), i.to_string()])).collect_vec();
    let mut pb = Problem::new(format!("simple_{parts}"), world);
    for (i, &g) in got.iter().enumerate() {
        pb.add_action(DurativeAction::new(format!("action_{i}"), Duration::fixed(4)).effect(g, true))?;
        pb.goals.insert(g);
    }
    pb.deadline = Some(deadline);
    Ok(pb)
}

/// Four goals, each achieved by one action: `eight` surely after 8, `four` with probability 0.7
/// after 4, `two` with probability 0.49 after 2 and `one` with probability 0.3 after 1.
/// The `garbage` actions achieve an atom that no goal needs.
pub fn strips_prob(garbage: usize, deadline: i64) -> Res<Problem> {
    let mut world = World::new();
    let [a, b, c, d, e] = ["a", "b", "c", "d", "e"].map(|part| world.intern(&["got", part]));
    let mut pb = Problem::new("strips_prob", world);

    pb.add_action(DurativeAction::new("eight", Duration::fixed(8)).effect(a, true))?;
    for (name, duration, p, atom) in [("four", 4, 0.7, b), ("two", 2, 0.49, c), ("one", 1, 0.3, d)] {
        let effect = ProbabilisticEffect::new(Distribution::bernoulli(p, [Lit::pos(atom)]));
        pb.add_action(DurativeAction::new(name, Duration::fixed(duration)).probabilistic_effect(effect))?;
    }
    for i in 0..garbage {
        pb.add_action(DurativeAction::new(format!("garbage{i}"), Duration::fixed(1)).effect(e, true))?;
    }
    pb.goals.extend([a, b, c, d]);
    pb.deadline = Some(deadline);
    Ok(pb)
}

/// Atoms of the machine shop, interned on first use.
struct Shop {
    world: World,
    objects: usize,
}

impl Shop {
    fn atom<S: AsRef<str>>(&mut self, fluent: &str, args: &[S]) -> Atom {
        let sexpr = std::iter::once(fluent).chain(args.iter().map(|a| a.as_ref())).collect_vec();
        self.world.intern(&sexpr)
    }

    fn pieces(&self) -> Vec<String> {
        (0..self.objects).map(|i| format!("x{i}")).collect()
    }

    fn machines(&self) -> Vec<String> {
        (0..self.objects).map(|i| format!("m{i}")).collect()
    }
}

/// Pieces `x0..xn` must be processed on machines `m0..mn`: even pieces shaped and smoothed by
/// the lathe/grind machines (even ones), odd pieces painted and polished by the others. A piece
/// must be placed on the machine where it is before being processed, and may be moved from one
/// machine to another.
///
/// Processing actions are only grounded on machines with the corresponding capability.
pub fn machine_shop(objects: usize, deadline: i64, mode: Mode) -> Res<(Problem, MachineShopFilter)> {
    ensure!(objects > 1, "The machine shop needs at least 2 objects, got {objects}");
    let regular = mode == Mode::Regular;
    let mut shop = Shop {
        world: World::new(),
        objects,
    };
    let pieces = shop.pieces();
    let machines = shop.machines();

    let mut init = AtomSet::new();
    let mut goals = AtomSet::new();
    let mut capabilities = HashMap::new();
    for (i, (p, m)) in pieces.iter().zip(&machines).enumerate() {
        init.insert(shop.atom("free", &[m]));
        goals.insert(shop.atom("free", &[m]));
        if i % 2 == 0 {
            init.insert(shop.atom("canlatroll", &[m]));
            init.insert(shop.atom("cangrind", &[m]));
            init.insert(shop.atom("at", &[p, m]));
            goals.insert(shop.atom("shaped", &[p]));
            goals.insert(shop.atom("smooth", &[p]));
            capabilities.insert(m.as_str(), vec!["canlatroll", "cangrind"]);
        } else {
            init.insert(shop.atom("canpolpaint", &[m]));
            init.insert(shop.atom("at", &[p, &machines[i - 1]]));
            goals.insert(shop.atom("painted", &[p]));
            goals.insert(shop.atom("polished", &[p]));
            capabilities.insert(m.as_str(), vec!["canpolpaint"]);
        }
    }
    let capable = |m: &str, capability: &str| capabilities.get(m).is_some_and(|c| c.contains(&capability));

    let mut actions = Vec::new();
    // operations that require the piece to be on the machine
    let operations = [
        ("polish", 10, "canpolpaint"),
        ("spraypaint", 6, "canpolpaint"),
        ("immersionpaint", 4, "canpolpaint"),
        ("lathe", 2, "canlatroll"),
        ("grind", 3, "cangrind"),
    ];
    for (name, duration, capability) in operations {
        for (p, m) in pieces.iter().cartesian_product(&machines) {
            if !capable(m.as_str(), capability) {
                continue;
            }
            let mut action = DurativeAction::new(format!("{name}_{p}_{m}"), Duration::fixed(duration))
                .condition(Timing::Start, shop.atom(capability, &[m]), true)
                .condition(Timing::Overall, shop.atom("on", &[p, m]), true);
            if regular {
                action = action.condition(Timing::Overall, shop.atom("at", &[p, m]), true);
            }
            let piece = |shop: &mut Shop, fluent: &str| shop.atom(fluent, &[p]);
            action = match name {
                "polish" => action.probabilistic_effect(bernoulli(0.9, piece(&mut shop, "polished"))),
                "spraypaint" => action.probabilistic_effect(bernoulli(0.8, piece(&mut shop, "painted"))),
                "immersionpaint" => {
                    let painted = piece(&mut shop, "painted");
                    let immersion = shop.atom("hasimmersion", &[m]);
                    let action = if regular {
                        action
                            .condition(Timing::Start, immersion, true)
                            .start_effect(immersion, false)
                    } else {
                        action.condition(Timing::Overall, immersion, true)
                    };
                    action.probabilistic_effect(ProbabilisticEffect::new(Distribution::Table(vec![
                        Outcome::new(0.57, [Lit::pos(painted), Lit::pos(immersion)]),
                        Outcome::new(0.38, [Lit::pos(painted), Lit::neg(immersion)]),
                        Outcome::new(0.02, [Lit::neg(immersion)]),
                        Outcome::new(0.03, [Lit::pos(immersion)]),
                    ])))
                }
                "lathe" => action
                    .effect(piece(&mut shop, "painted"), false)
                    .effect(piece(&mut shop, "smooth"), false)
                    .probabilistic_effect(bernoulli(0.9, piece(&mut shop, "shaped"))),
                _ => action.probabilistic_effect(bernoulli(0.9, piece(&mut shop, "smooth"))),
            };
            actions.push(action);
        }
    }

    for m in &machines {
        let immersion = shop.atom("hasimmersion", &[m]);
        actions.push(DurativeAction::new(format!("buyimmersion_{m}"), Duration::fixed(5)).effect(immersion, true));
    }

    for (p, m) in pieces.iter().cartesian_product(&machines) {
        let free = shop.atom("free", &[m]);
        let action = DurativeAction::new(format!("place_{p}_{m}"), Duration::fixed(1))
            .condition(Timing::Overall, shop.atom("at", &[p, m]), true)
            .effect(shop.atom("on", &[p, m]), true);
        actions.push(if regular {
            action.condition(Timing::Start, free, true).start_effect(free, false)
        } else {
            action.condition(Timing::Overall, free, true).effect(free, false)
        });
    }

    for (p, from, to) in pieces
        .iter()
        .cartesian_product(machines.iter().cartesian_product(&machines))
        .filter(|(_, (from, to))| from != to)
        .map(|(p, (from, to))| (p, from, to))
    {
        let at_from = shop.atom("at", &[p, from]);
        let at_to = shop.atom("at", &[p, to]);
        let on_from = shop.atom("on", &[p, from]);
        let free_from = shop.atom("free", &[from]);
        let action = DurativeAction::new(format!("move_{p}_{from}_{to}"), Duration::fixed(3));
        let action = if regular {
            action.condition(Timing::Start, at_from, true).start_effect(at_from, false)
        } else {
            action.condition(Timing::Overall, at_from, true)
        };
        // a piece that was placed on its machine frees it, even if the move fails
        let distribution = Distribution::Conditional {
            condition: Lit::pos(on_from),
            then: vec![
                Outcome::new(
                    0.9,
                    [Lit::pos(at_to), Lit::neg(at_from), Lit::neg(on_from), Lit::pos(free_from)],
                ),
                Outcome::new(0.1, [Lit::neg(on_from), Lit::pos(free_from), Lit::pos(at_from)]),
            ],
            otherwise: vec![
                Outcome::new(0.9, [Lit::pos(at_to), Lit::neg(at_from)]),
                Outcome::new(0.1, [Lit::pos(at_from)]),
            ],
        };
        actions.push(action.probabilistic_effect(ProbabilisticEffect::new(distribution)));
    }

    let filter = MachineShopFilter::new(&shop.world, &pieces, &machines);
    let mut pb = Problem::new(format!("machine_shop_{mode}"), shop.world);
    for action in actions {
        pb.add_action(action)?;
    }
    pb.init = init;
    pb.goals = goals;
    pb.deadline = Some(deadline);
    Ok((pb, filter))
}

fn bernoulli(p: f64, atom: Atom) -> ProbabilisticEffect {
    ProbabilisticEffect::new(Distribution::bernoulli(p, [Lit::pos(atom)]))
}

#[derive(Copy, Clone, Debug)]
struct Placement {
    /// `on` if true, `at` otherwise.
    on: bool,
    piece: usize,
    machine: usize,
}

impl Placement {
    fn conflicts(&self, other: &Placement) -> bool {
        let piece_on_two_machines = self.piece == other.piece && self.machine != other.machine;
        let machine_with_two_pieces =
            self.on && other.on && self.machine == other.machine && self.piece != other.piece;
        piece_on_two_machines || machine_with_two_pieces
    }
}

/// Rejects the combinations that need a piece on (or at) two machines, or a machine carrying two
/// pieces.
pub struct MachineShopFilter {
    placements: HashMap<Atom, Placement>,
}

impl MachineShopFilter {
    fn new(world: &World, pieces: &[String], machines: &[String]) -> Self {
        let mut placements = HashMap::new();
        for ((piece, p), (machine, m)) in pieces.iter().enumerate().cartesian_product(machines.iter().enumerate()) {
            for (fluent, on) in [("on", true), ("at", false)] {
                if let Some(atom) = world.atom(&[fluent, p.as_str(), m.as_str()]) {
                    placements.insert(atom, Placement { on, piece, machine });
                }
            }
        }
        MachineShopFilter { placements }
    }
}

impl CombinationFilter for MachineShopFilter {
    fn allows(&self, members: &[&Durative], candidate: &Durative) -> bool {
        let placements = members
            .iter()
            .copied()
            .chain(std::iter::once(candidate))
            .flat_map(|a| a.pre.pos.iter())
            .filter_map(|atom| self.placements.get(&atom))
            .collect_vec();
        !placements.iter().tuple_combinations().any(|(a, b)| a.conflicts(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_domains() {
        for domain in [Domain::Simple, Domain::StripsProb, Domain::MachineShop] {
            assert_eq!(Domain::from_str(&domain.to_string()), Ok(domain));
        }
        assert!(Domain::from_str("rover").is_err());
    }

    #[test]
    fn simple_problem() {
        let pb = simple(3, 10).unwrap();
        assert_eq!(pb.actions().len(), 3);
        assert_eq!(pb.goals.len(), 3);
        assert!(pb.init.is_empty());
        assert_eq!(pb.deadline, Some(10));

        let compiled = Instance::new(Domain::Simple, Params { objects: 0, garbage: 3, deadline: 10 }, Mode::Regular)
            .unwrap()
            .compile(Mode::Regular);
        assert_eq!(compiled.problem.actions().len(), 6);
        assert!(compiled.problem.find("start_action_2").is_some());
    }

    #[test]
    fn simple_problem_is_solved() {
        use rand::SeedableRng;
        use rand::rngs::SmallRng;
        use tempo_engine::{PlannerConfig, plan};

        let instance = Instance::new(Domain::Simple, Params { objects: 0, garbage: 2, deadline: 10 }, Mode::Regular)
            .unwrap();
        let compiled = instance.compile(Mode::Regular);
        let config = PlannerConfig {
            max_iterations: Some(100),
            search_time: std::time::Duration::from_secs(60),
            ..Default::default()
        };
        let mut rng = SmallRng::seed_from_u64(0);
        let result = plan(&compiled.problem, &compiled.heuristic, &config, &mut rng).unwrap();
        assert!(result.is_success());
        assert!(result.makespan().is_some_and(|m| (4..=8).contains(&m)));
    }

    #[test]
    fn strips_problem() {
        let pb = strips_prob(2, 20).unwrap();
        let names = pb.actions().iter().map(|a| a.name()).collect_vec();
        assert_eq!(names, vec!["eight", "four", "two", "one", "garbage0", "garbage1"]);
        assert_eq!(pb.goals.len(), 4);
        let e = pb.world.atom(&["got", "e"]).unwrap();
        assert!(!pb.goals.contains(e));
    }

    fn names(pb: &Problem) -> Vec<&str> {
        pb.actions().iter().map(|a| a.name()).collect()
    }

    #[test]
    fn machine_shop_problem() {
        assert!(machine_shop(1, 20, Mode::Regular).is_err());

        let (pb, _) = machine_shop(2, 20, Mode::Regular).unwrap();
        let names = names(&pb);
        // x0 and x1 start at m0, m0 processes shapes, m1 paints
        assert!(names.contains(&"polish_x1_m1"));
        assert!(names.contains(&"lathe_x0_m0"));
        assert!(!names.contains(&"polish_x0_m0"));
        assert!(!names.contains(&"move_x0_m0_m0"));
        // polish, spraypaint, immersionpaint, lathe, grind, buyimmersion, place, move
        assert_eq!(names.len(), 2 * 5 + 2 + 4 + 4);

        let at = |p: &str, m: &str| pb.world.atom(&["at", p, m]).unwrap();
        assert!(pb.init.contains(at("x0", "m0")));
        assert!(pb.init.contains(at("x1", "m0")));
        assert!(!pb.init.contains(at("x1", "m1")));
        assert_eq!(pb.goals.len(), 2 + 2 * 2);
    }

    #[test]
    fn move_outcomes_depend_on_the_placement() {
        let (pb, _) = machine_shop(2, 20, Mode::Combination).unwrap();
        let GroundAction::Durative(action) = pb.actions().iter().find(|a| a.name() == "move_x1_m0_m1").unwrap()
        else {
            panic!("move is durative");
        };
        let on = pb.world.atom(&["on", "x1", "m0"]).unwrap();
        let placed = State::with_atoms(pb.world.len(), [on]);
        let not_placed = State::with_atoms(pb.world.len(), []);
        let distribution = &action.prob[0].distribution;
        assert_eq!(distribution.outcomes(&placed)[0].assignment.len(), 4);
        assert_eq!(distribution.outcomes(&not_placed)[0].assignment.len(), 2);
    }

    #[test]
    fn combinations_respect_placements() {
        let instance = Instance::new(
            Domain::MachineShop,
            Params {
                objects: 2,
                garbage: 0,
                deadline: 30,
            },
            Mode::Combination,
        )
        .unwrap();
        let compiled = instance.compile(Mode::Combination);
        let combinations = compiled
            .problem
            .actions()
            .iter()
            .filter_map(|a| match a {
                Action::Combination(c) => Some(c.name.split(',').collect_vec()),
                _ => None,
            })
            .collect_vec();
        let together = |a: &str, b: &str| combinations.iter().any(|c| c.contains(&a) && c.contains(&b));
        assert!(together("polish_x1_m1", "lathe_x0_m0"));
        // x1 cannot be on both machines
        assert!(!together("polish_x1_m1", "grind_x1_m0"));
        // m1 cannot carry both pieces
        assert!(!together("polish_x0_m1", "spraypaint_x1_m1"));
        assert!(compiled.heuristic.find("start_polish_x1_m1").is_some());
    }
}
