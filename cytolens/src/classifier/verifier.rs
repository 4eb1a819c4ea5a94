use crate::patch::CellPatch;

/// Answer of a human asked to label a low-confidence cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Category(String),
    Ignore,
}

/// Synchronous human-in-the-loop labeling.
///
/// Called with the quantised patch and the ordered category list; blocks until
/// the human answers.
pub trait HumanVerifier {
    fn verify(&mut self, patch: &CellPatch, categories: &[String]) -> Verdict;
}

impl<F> HumanVerifier for F
where
    F: FnMut(&CellPatch, &[String]) -> Verdict,
{
    fn verify(&mut self, patch: &CellPatch, categories: &[String]) -> Verdict {
        self(patch, categories)
    }
}
