//! Execution planner - orders selected resources for a verb
//!
//! Resources with an explicit sequence number run first for forward verbs,
//! in ascending order, and last for backward verbs, in descending order, so
//! the last resource started is the first one stopped. Unnumbered resources
//! keep their declaration order. Equal sequence numbers are broken by driver
//! group precedence, then declaration order.

use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::types::{Direction, Verb};

/// Driver groups in forward precedence order, used only to break ties
/// between resources declaring the same sequence number.
const GROUP_PRECEDENCE: &[&str] = &[
    "ip", "disk", "fs", "share", "container", "app", "sync", "task",
];

/// A plan truncation point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Barrier {
    /// Stop after this rid, whatever the direction
    To(String),
    /// Stop after this rid, forward verbs only
    UpTo(String),
    /// Stop after this rid, backward verbs only
    DownTo(String),
}

impl Barrier {
    fn rid(&self) -> &str {
        match self {
            Self::To(rid) | Self::UpTo(rid) | Self::DownTo(rid) => rid,
        }
    }
}

/// An ordered sequence of resources for one verb
pub struct ExecutionPlan<'a> {
    verb: Verb,
    steps: Vec<&'a dyn Resource>,
}

impl<'a> ExecutionPlan<'a> {
    /// Order candidate resources (in declaration order) for a verb
    pub fn build(resources: Vec<&'a dyn Resource>, verb: Verb) -> Self {
        let direction = verb.direction();
        let mut keyed: Vec<(usize, &'a dyn Resource)> = resources.into_iter().enumerate().collect();

        keyed.sort_by(|(ia, a), (ib, b)| {
            let order = match (a.seq(), b.seq()) {
                (Some(sa), Some(sb)) => {
                    let by_seq = sa
                        .cmp(&sb)
                        .then_with(|| group_rank(*a).cmp(&group_rank(*b)));
                    match direction {
                        Direction::Forward => by_seq,
                        Direction::Backward => by_seq.reverse(),
                    }
                }
                // numbered before unnumbered going forward, after going backward
                (Some(_), None) => match direction {
                    Direction::Forward => std::cmp::Ordering::Less,
                    Direction::Backward => std::cmp::Ordering::Greater,
                },
                (None, Some(_)) => match direction {
                    Direction::Forward => std::cmp::Ordering::Greater,
                    Direction::Backward => std::cmp::Ordering::Less,
                },
                (None, None) => std::cmp::Ordering::Equal,
            };
            order.then_with(|| ia.cmp(ib))
        });

        Self {
            verb,
            steps: keyed.into_iter().map(|(_, r)| r).collect(),
        }
    }

    /// Truncate the plan after a barrier resource (inclusive)
    pub fn truncate_at(mut self, barrier: Option<&Barrier>) -> Result<Self> {
        let Some(barrier) = barrier else {
            return Ok(self);
        };
        match (barrier, self.verb.direction()) {
            (Barrier::UpTo(_), Direction::Backward) => {
                return Err(Error::BarrierDirection {
                    barrier: "upto",
                    verb: self.verb,
                });
            }
            (Barrier::DownTo(_), Direction::Forward) => {
                return Err(Error::BarrierDirection {
                    barrier: "downto",
                    verb: self.verb,
                });
            }
            _ => {}
        }
        let pos = self
            .steps
            .iter()
            .position(|r| r.rid() == barrier.rid())
            .ok_or_else(|| Error::UnknownBarrier(barrier.rid().to_string()))?;
        self.steps.truncate(pos + 1);
        Ok(self)
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn steps(&self) -> &[&'a dyn Resource] {
        &self.steps
    }

    /// RIDs in plan order
    pub fn rids(&self) -> Vec<&str> {
        self.steps.iter().map(|r| r.rid()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn group_rank(r: &dyn Resource) -> usize {
    GROUP_PRECEDENCE
        .iter()
        .position(|g| *g == r.driver_group())
        .unwrap_or(GROUP_PRECEDENCE.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ActionContext;
    use crate::resource::BoxedResource;
    use crate::types::ActionOutcome;

    #[derive(Debug)]
    struct Res {
        rid: &'static str,
        seq: Option<i64>,
    }

    impl Resource for Res {
        fn rid(&self) -> &str {
            self.rid
        }
        fn seq(&self) -> Option<i64> {
            self.seq
        }
        fn action(&self, _verb: Verb, _ctx: &mut ActionContext) -> anyhow::Result<ActionOutcome> {
            Ok(ActionOutcome::done())
        }
    }

    fn resources(spec: &[(&'static str, Option<i64>)]) -> Vec<BoxedResource> {
        spec.iter()
            .map(|&(rid, seq)| Box::new(Res { rid, seq }) as BoxedResource)
            .collect()
    }

    fn plan<'a>(resources: &'a [BoxedResource], verb: Verb) -> ExecutionPlan<'a> {
        ExecutionPlan::build(resources.iter().map(|r| &**r).collect(), verb)
    }

    #[test]
    fn test_forward_numbered_then_declaration_order() {
        let res = resources(&[
            ("app#u1", None),
            ("app#2", Some(2)),
            ("app#1", Some(1)),
            ("app#u2", None),
            ("app#3", Some(3)),
        ]);
        let start = plan(&res, Verb::Start);
        assert_eq!(start.rids(), ["app#1", "app#2", "app#3", "app#u1", "app#u2"]);

        // idempotent
        assert_eq!(plan(&res, Verb::Start).rids(), start.rids());
    }

    #[test]
    fn test_backward_unnumbered_then_descending() {
        let res = resources(&[
            ("app#u1", None),
            ("app#2", Some(2)),
            ("app#1", Some(1)),
            ("app#u2", None),
            ("app#3", Some(3)),
        ]);
        let stop = plan(&res, Verb::Stop);
        assert_eq!(stop.rids(), ["app#u1", "app#u2", "app#3", "app#2", "app#1"]);
    }

    #[test]
    fn test_stop_reverses_start_with_symmetric_numbering() {
        let res = resources(&[("ip#1", Some(20)), ("app#1", Some(10)), ("fs#1", Some(30))]);
        let start_plan = plan(&res, Verb::Start);
        let stop_plan = plan(&res, Verb::Stop);
        let mut start = start_plan.rids();
        let stop = stop_plan.rids();
        start.reverse();
        assert_eq!(start, stop);
    }

    #[test]
    fn test_equal_seq_uses_group_precedence() {
        let res = resources(&[("app#1", Some(1)), ("ip#1", Some(1)), ("disk#1", Some(1))]);
        assert_eq!(plan(&res, Verb::Start).rids(), ["ip#1", "disk#1", "app#1"]);
        assert_eq!(plan(&res, Verb::Stop).rids(), ["app#1", "disk#1", "ip#1"]);
    }

    #[test]
    fn test_barriers() {
        let res = resources(&[("ip#1", Some(1)), ("fs#1", Some(2)), ("app#1", Some(3))]);

        let p = plan(&res, Verb::Start)
            .truncate_at(Some(&Barrier::UpTo("fs#1".into())))
            .unwrap();
        assert_eq!(p.rids(), ["ip#1", "fs#1"]);

        let p = plan(&res, Verb::Stop)
            .truncate_at(Some(&Barrier::To("fs#1".into())))
            .unwrap();
        assert_eq!(p.rids(), ["app#1", "fs#1"]);

        assert!(matches!(
            plan(&res, Verb::Stop).truncate_at(Some(&Barrier::UpTo("fs#1".into()))),
            Err(Error::BarrierDirection { .. })
        ));
        assert!(matches!(
            plan(&res, Verb::Start).truncate_at(Some(&Barrier::To("disk#9".into()))),
            Err(Error::UnknownBarrier(_))
        ));
    }
}
