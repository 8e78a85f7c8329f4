use itertools::Itertools;

use crate::ir1_semantic_tokens::SemanticToken;

pub(crate) fn reconstruct_src<'a, 'input: 'a>(tokens: impl IntoIterator<Item = &'a SemanticToken<'input>>) -> String {
    let mut vec = tokens.into_iter().collect::<Vec<_>>();
    vec.sort_by_key(|token| token.span().start);
    vec.dedup();
    vec.into_iter()
        .map(SemanticToken::source_text)
        .join("")
}
