use crate::decl::Decl;

/// Generic declarations visible while resolving a signature, innermost last.
///
/// A type variable `T` resolves to the innermost frame that declares `T`;
/// unknown names fall back to the outermost frame (the class), which keeps
/// signatures referring to an enclosing class's parameters resolvable.
#[derive(Debug, Clone, Default)]
pub struct TypeScope {
    frames: Vec<(Decl, Vec<String>)>,
}

impl TypeScope {
    pub fn new(owner: Decl, params: impl IntoIterator<Item = String>) -> Self {
        Self {
            frames: vec![(owner, params.into_iter().collect())],
        }
    }

    pub fn push(&mut self, owner: Decl, params: impl IntoIterator<Item = String>) {
        self.frames.push((owner, params.into_iter().collect()));
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn owner_of(&self, name: &str) -> Option<&Decl> {
        self.frames
            .iter()
            .rev()
            .find(|(_, params)| params.iter().any(|p| p == name))
            .or_else(|| self.frames.first())
            .map(|(owner, _)| owner)
    }
}
