//! The arithmetic challenge that gates stopping an active alarm.
//!
//! A gate is a fixed batch of problems answered strictly in order. A wrong
//! answer never advances and is never counted; progress lives only in
//! memory, so a restarted host starts over with a fresh batch.

use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;
use serde::{Deserialize, Serialize};

use crate::error::ChallengeError;
use crate::storage::ChallengeConfig;

/// Generated operands are clamped to `-OPERAND_LIMIT..=OPERAND_LIMIT`.
pub const OPERAND_LIMIT: i64 = 1_000_000;

/// Arithmetic operator a problem may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Add,
    Sub,
    Mul,
}

impl Operator {
    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '×',
        }
    }

    fn apply(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            Operator::Add => lhs.saturating_add(rhs),
            Operator::Sub => lhs.saturating_sub(rhs),
            Operator::Mul => lhs.saturating_mul(rhs),
        }
    }
}

/// One problem. `lhs >= rhs` always holds, so subtraction never goes
/// negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub lhs: i64,
    pub rhs: i64,
    pub operator: Operator,
}

impl Problem {
    pub fn new(a: i64, b: i64, operator: Operator) -> Self {
        Self {
            lhs: a.max(b),
            rhs: a.min(b),
            operator,
        }
    }

    pub fn answer(&self) -> i64 {
        self.operator.apply(self.lhs, self.rhs)
    }

    /// Prompt text, e.g. `"42 + 7 = ?"`.
    pub fn prompt(&self) -> String {
        format!("{} {} {} = ?", self.lhs, self.operator.symbol(), self.rhs)
    }
}

/// Result of submitting one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Correct; the next problem is now current.
    Advanced,
    /// Wrong; the same problem stays current.
    Rejected,
    /// Correct answer to the last problem.
    Solved,
}

#[derive(Debug, Clone)]
pub struct ChallengeGate {
    problems: Vec<Problem>,
    index: usize,
    correct_count: usize,
}

impl ChallengeGate {
    /// Generate a fresh batch, seeded from `config.seed` when set.
    pub fn generate(config: &ChallengeConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
            None => Mcg128Xsl64::from_entropy(),
        };
        Self::generate_with(config, &mut rng)
    }

    pub fn generate_with<R: Rng>(config: &ChallengeConfig, rng: &mut R) -> Self {
        let min = config.operand_min.clamp(-OPERAND_LIMIT, OPERAND_LIMIT);
        let max = config.operand_max.clamp(-OPERAND_LIMIT, OPERAND_LIMIT);
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        let operators: &[Operator] = if config.operators.is_empty() {
            &[Operator::Add]
        } else {
            &config.operators
        };

        let problems = (0..config.problem_count.max(1))
            .map(|_| {
                let a = rng.gen_range(low..=high);
                let b = rng.gen_range(low..=high);
                let operator = operators.choose(&mut *rng).copied().unwrap_or(Operator::Add);
                Problem::new(a, b, operator)
            })
            .collect();
        Self::from_problems(problems)
    }

    /// A gate over a fixed batch. An empty batch is already solved.
    pub fn from_problems(problems: Vec<Problem>) -> Self {
        Self {
            problems,
            index: 0,
            correct_count: 0,
        }
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    /// The problem awaiting an answer, `None` once solved.
    pub fn current(&self) -> Option<&Problem> {
        self.problems.get(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn correct_count(&self) -> usize {
        self.correct_count
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn is_solved(&self) -> bool {
        self.index >= self.problems.len()
    }

    /// Answer the current problem. Once solved, every further submission
    /// reports `Solved` without changing anything.
    pub fn submit(&mut self, answer: i64) -> Verdict {
        let Some(problem) = self.current() else {
            return Verdict::Solved;
        };
        if problem.answer() != answer {
            return Verdict::Rejected;
        }
        self.index += 1;
        self.correct_count += 1;
        if self.is_solved() {
            Verdict::Solved
        } else {
            Verdict::Advanced
        }
    }

    /// Answer from raw user input.
    ///
    /// # Errors
    /// Blank or non-integer input is rejected without touching the gate.
    pub fn submit_text(&mut self, input: &str) -> Result<Verdict, ChallengeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ChallengeError::EmptyAnswer);
        }
        let answer = trimmed
            .parse::<i64>()
            .map_err(|_| ChallengeError::NotANumber(trimmed.to_string()))?;
        Ok(self.submit(answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gate() -> ChallengeGate {
        ChallengeGate::from_problems(vec![
            Problem::new(3, 4, Operator::Add),
            Problem::new(10, 2, Operator::Sub),
            Problem::new(6, 7, Operator::Mul),
            Problem::new(50, 1, Operator::Add),
        ])
    }

    #[test]
    fn operands_are_ordered() {
        let p = Problem::new(3, 9, Operator::Sub);
        assert_eq!((p.lhs, p.rhs), (9, 3));
        assert_eq!(p.answer(), 6);
        assert_eq!(p.prompt(), "9 - 3 = ?");
    }

    #[test]
    fn four_correct_answers_solve() {
        let mut g = gate();
        assert_eq!(g.submit(7), Verdict::Advanced);
        assert_eq!(g.submit(8), Verdict::Advanced);
        assert_eq!(g.submit(42), Verdict::Advanced);
        assert!(!g.is_solved());
        assert_eq!(g.submit(51), Verdict::Solved);
        assert!(g.is_solved());
        assert_eq!(g.correct_count(), 4);
        assert!(g.current().is_none());
    }

    #[test]
    fn wrong_answer_does_not_advance() {
        let mut g = gate();
        assert_eq!(g.submit(7), Verdict::Advanced);
        assert_eq!(g.submit(9), Verdict::Rejected);
        assert_eq!(g.submit(-1), Verdict::Rejected);
        assert_eq!(g.index(), 1);
        assert_eq!(g.correct_count(), 1);
        assert_eq!(g.submit(8), Verdict::Advanced);
        assert_eq!(g.index(), 2);
    }

    #[test]
    fn text_input_is_validated() {
        let mut g = gate();
        assert_eq!(g.submit_text("   "), Err(ChallengeError::EmptyAnswer));
        assert_eq!(
            g.submit_text("seven"),
            Err(ChallengeError::NotANumber("seven".into()))
        );
        assert_eq!(g.index(), 0);
        assert_eq!(g.submit_text(" 7 "), Ok(Verdict::Advanced));
    }

    #[test]
    fn solved_gate_stays_solved() {
        let mut g = ChallengeGate::from_problems(vec![Problem::new(1, 1, Operator::Add)]);
        assert_eq!(g.submit(2), Verdict::Solved);
        assert_eq!(g.submit(0), Verdict::Solved);
        assert_eq!(g.correct_count(), 1);
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let config = ChallengeConfig {
            seed: Some(42),
            ..ChallengeConfig::default()
        };
        let a = ChallengeGate::generate(&config);
        let b = ChallengeGate::generate(&config);
        assert_eq!(a.problems(), b.problems());
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn inverted_range_and_empty_operators_are_tolerated() {
        let config = ChallengeConfig {
            operand_min: 9,
            operand_max: 3,
            operators: vec![],
            problem_count: 0,
            seed: Some(1),
        };
        let g = ChallengeGate::generate(&config);
        assert_eq!(g.len(), 1);
        let p = g.problems()[0];
        assert_eq!(p.operator, Operator::Add);
        assert!((3..=9).contains(&p.lhs) && (3..=9).contains(&p.rhs));
    }

    #[test]
    fn huge_operand_range_is_clamped() {
        let config = ChallengeConfig {
            operand_min: 4_000_000_000,
            operand_max: 5_000_000_000,
            operators: vec![Operator::Mul],
            problem_count: 8,
            seed: Some(3),
        };
        let g = ChallengeGate::generate(&config);
        for p in g.problems() {
            assert_eq!((p.lhs, p.rhs), (OPERAND_LIMIT, OPERAND_LIMIT));
            assert_eq!(p.answer(), OPERAND_LIMIT * OPERAND_LIMIT);
        }
    }

    #[test]
    fn fixed_problems_saturate_instead_of_overflowing() {
        assert_eq!(Problem::new(i64::MAX, 2, Operator::Mul).answer(), i64::MAX);
        assert_eq!(Problem::new(i64::MAX, 1, Operator::Add).answer(), i64::MAX);
        assert_eq!(Problem::new(i64::MIN, i64::MAX, Operator::Sub).answer(), i64::MAX);
    }

    proptest! {
        #[test]
        fn generated_problems_respect_config(seed in any::<u64>()) {
            let config = ChallengeConfig {
                operators: vec![Operator::Add, Operator::Sub, Operator::Mul],
                seed: Some(seed),
                ..ChallengeConfig::default()
            };
            let g = ChallengeGate::generate(&config);
            prop_assert_eq!(g.len(), config.problem_count);
            for p in g.problems() {
                prop_assert!(p.lhs >= p.rhs);
                prop_assert!((config.operand_min..=config.operand_max).contains(&p.lhs));
                prop_assert!((config.operand_min..=config.operand_max).contains(&p.rhs));
                prop_assert!(p.answer() >= 0);
            }
        }

        #[test]
        fn only_correct_answers_count(wrong in proptest::collection::vec(any::<bool>(), 0..20)) {
            let mut g = gate();
            let mut expected_index = 0;
            for miss in wrong {
                if g.is_solved() { break; }
                let answer = g.current().map(|p| p.answer()).unwrap_or_default();
                if miss {
                    prop_assert_eq!(g.submit(answer + 1), Verdict::Rejected);
                } else {
                    g.submit(answer);
                    expected_index += 1;
                }
                prop_assert_eq!(g.index(), expected_index);
                prop_assert_eq!(g.correct_count(), expected_index);
            }
        }
    }
}
