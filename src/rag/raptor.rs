//! RAPTOR: hierarchical summarization tree over a document's chunks
//!
//! Leaves (level 0) are chunk embeddings. Each level clusters the previous level's
//! nodes by cosine similarity and summarizes every multi-member cluster into a parent
//! node. Nodes live in a flat arena and refer to each other by id only.

use std::collections::HashMap;
use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::chunking::document_id;
use super::strategy::dedupe_chunks;
use super::strategy::GenerationInput;
use super::strategy::RagStrategy;
use super::strategy::StrategyCore;
use crate::config::RaptorConfig;
use crate::embeddings::cosine_similarity;
use crate::errors::DeepRagError;
use crate::errors::Result;
use crate::llm::RagPrompts;
use crate::models::Capabilities;
use crate::models::Metadata;
use crate::models::RagConfig;
use crate::models::RagResult;
use crate::models::RagSource;
use crate::models::Tier;
use crate::models::TreeNode;
use crate::vector_store::Condition;
use crate::vector_store::SearchHit;
use crate::vector_store::CHUNK_KEY;
use crate::vector_store::DOCUMENT_KEY;
use crate::vector_store::LEVEL_KEY;
use crate::vector_store::TREE_KEY;

/// Flat node arena for one document's tree
#[derive(Debug, Clone, Default)]
pub struct RaptorTree {
    pub tree_id: String,
    nodes: Vec<TreeNode>,
    index: HashMap<String, usize>,
}

impl RaptorTree {
    #[must_use]
    pub fn new(tree_id: impl Into<String>) -> Self {
        Self {
            tree_id: tree_id.into(),
            ..Self::default()
        }
    }

    /// Insert a node; ids must be unique
    pub fn push(&mut self, node: TreeNode) -> Result<usize> {
        if self.index.contains_key(&node.node_id) {
            return Err(DeepRagError::Validation(format!(
                "duplicate tree node id {}",
                node.node_id
            )));
        }
        let idx = self.nodes.len();
        self.index.insert(node.node_id.clone(), idx);
        self.nodes.push(node);
        Ok(idx)
    }

    #[must_use]
    pub fn get(&self, node_id: &str) -> Option<&TreeNode> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    #[must_use]
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn level(&self, level: u32) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter().filter(move |n| n.level == level)
    }

    /// Nodes without a parent
    pub fn roots(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter().filter(|n| n.is_root())
    }

    /// Highest level present
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.nodes.iter().map(|n| n.level).max().unwrap_or(0)
    }

    /// Attach a new summary node above `children`
    fn adopt(&mut self, mut parent: TreeNode, children: &[usize]) -> Result<usize> {
        parent.children = children
            .iter()
            .map(|&i| self.nodes[i].node_id.clone())
            .collect();
        let parent_id = parent.node_id.clone();
        let idx = self.push(parent)?;
        for &child in children {
            self.nodes[child].parent = Some(parent_id.clone());
        }
        Ok(idx)
    }

    /// Chunk id a leaf was built from, recovered from its node id
    #[must_use]
    pub fn leaf_chunk_id<'a>(&self, node: &'a TreeNode) -> Option<&'a str> {
        if node.level != 0 {
            return None;
        }
        node.node_id
            .strip_prefix(self.tree_id.as_str())
            .and_then(|rest| rest.strip_prefix(":L0:"))
    }

    /// Ids from `node_id`'s parent up to its root
    #[must_use]
    pub fn ancestors(&self, node_id: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self.get(node_id);
        while let Some(parent_id) = current.and_then(|n| n.parent.as_deref()) {
            if chain.len() > self.nodes.len() {
                break;
            }
            chain.push(parent_id);
            current = self.get(parent_id);
        }
        chain
    }

    /// Check parent/child symmetry, strictly increasing levels and acyclicity
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            if let Some(parent_id) = &node.parent {
                let parent = self.get(parent_id).ok_or_else(|| {
                    DeepRagError::Validation(format!(
                        "{} references missing parent {parent_id}",
                        node.node_id
                    ))
                })?;
                if parent.level <= node.level {
                    return Err(DeepRagError::Validation(format!(
                        "parent {parent_id} is not above {}",
                        node.node_id
                    )));
                }
                if !parent.children.contains(&node.node_id) {
                    return Err(DeepRagError::Validation(format!(
                        "{parent_id} does not list child {}",
                        node.node_id
                    )));
                }
            }
            for child_id in &node.children {
                let child = self.get(child_id).ok_or_else(|| {
                    DeepRagError::Validation(format!(
                        "{} references missing child {child_id}",
                        node.node_id
                    ))
                })?;
                if child.parent.as_deref() != Some(node.node_id.as_str()) {
                    return Err(DeepRagError::Validation(format!(
                        "{child_id} has a different parent than {}",
                        node.node_id
                    )));
                }
            }

            let mut seen = HashSet::from([node.node_id.as_str()]);
            for ancestor in self.ancestors(&node.node_id) {
                if !seen.insert(ancestor) {
                    return Err(DeepRagError::Validation(format!(
                        "cycle through {}",
                        node.node_id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Greedy seed clustering: each unclustered item, in order, absorbs every later
/// unclustered item whose similarity to it exceeds `threshold`
#[must_use]
pub fn cluster_by_similarity(embeddings: &[Vec<f32>], threshold: f32) -> Vec<Vec<usize>> {
    let mut assigned = vec![false; embeddings.len()];
    let mut clusters = Vec::new();
    for seed in 0..embeddings.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut cluster = vec![seed];
        for candidate in seed + 1..embeddings.len() {
            if !assigned[candidate]
                && cosine_similarity(&embeddings[seed], &embeddings[candidate]) > threshold
            {
                assigned[candidate] = true;
                cluster.push(candidate);
            }
        }
        clusters.push(cluster);
    }
    clusters
}

/// Strategy that stores a summary tree per document and searches all of its levels
pub struct RaptorRag {
    core: StrategyCore,
    settings: RaptorConfig,
}

impl RaptorRag {
    /// Create a RAPTOR strategy with its tree-building settings
    #[must_use]
    pub fn new(core: StrategyCore, settings: RaptorConfig) -> Self {
        Self { core, settings }
    }

    async fn summarize(&self, texts: Vec<&str>) -> Result<(String, Vec<f32>)> {
        let passages = texts
            .iter()
            .enumerate()
            .map(|(i, t)| format!("Passage {}: {}", i + 1, t))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = RagPrompts::cluster_summary().render(&[("passages", passages.as_str())])?;
        let summary = self
            .core
            .providers
            .generate(
                &prompt,
                self.settings.summary_temperature,
                self.settings.summary_max_tokens,
            )
            .await?;
        let embedding = self.core.providers.embed(&summary).await?;
        Ok((summary, embedding))
    }

    /// Build the full tree for one document; degradations are returned as warnings
    pub async fn build_tree(&self, content: &str, user_id: &str) -> Result<(RaptorTree, Vec<String>)> {
        let tree_id = document_id(user_id, content);
        let mut tree = RaptorTree::new(tree_id.clone());
        let mut warnings = Vec::new();

        let chunks = self.core.chunk(content);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.core.providers.embed_batch(&texts).await;

        let mut frontier = Vec::new();
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            let node_id = format!("{tree_id}:L0:{}", chunk.id);
            match embedding {
                Ok(embedding) => {
                    frontier.push(tree.push(TreeNode {
                        node_id,
                        text: chunk.text,
                        embedding,
                        level: 0,
                        parent: None,
                        children: Vec::new(),
                    })?);
                }
                Err(e) => {
                    warn!("Excluding leaf {} from tree: {}", node_id, e);
                    warnings.push(format!("{node_id}: {e}"));
                }
            }
        }

        if tree.is_empty() {
            return Err(DeepRagError::Validation(
                "document produced no embeddable chunks".to_string(),
            ));
        }

        let mut level = 1;
        while frontier.len() > 1 && level <= self.settings.max_levels {
            let frontier_embeddings: Vec<Vec<f32>> = frontier
                .iter()
                .map(|&i| tree.nodes()[i].embedding.clone())
                .collect();
            let clusters: Vec<Vec<usize>> =
                cluster_by_similarity(&frontier_embeddings, self.settings.cluster_threshold)
                    .into_iter()
                    .map(|c| c.into_iter().map(|pos| frontier[pos]).collect())
                    .collect();

            let (groups, singletons): (Vec<Vec<usize>>, Vec<Vec<usize>>) =
                clusters.into_iter().partition(|c| c.len() >= 2);
            if groups.is_empty() {
                debug!("Level {} produced no further compression", level);
                break;
            }

            let summaries = join_all(groups.iter().map(|members| {
                let texts = members
                    .iter()
                    .map(|&i| tree.nodes()[i].text.as_str())
                    .collect();
                self.summarize(texts)
            }))
            .await;

            let mut next = Vec::new();
            for (members, summary) in groups.iter().zip(summaries) {
                match summary {
                    Ok((text, embedding)) => {
                        let node = TreeNode {
                            node_id: format!("{tree_id}:L{level}:{}", next.len()),
                            text,
                            embedding,
                            level,
                            parent: None,
                            children: Vec::new(),
                        };
                        next.push(tree.adopt(node, members)?);
                    }
                    Err(e) => {
                        warn!("Skipping cluster of {} at level {}: {}", members.len(), level, e);
                        warnings.push(format!("level {level} cluster skipped: {e}"));
                    }
                }
            }
            if next.is_empty() {
                break;
            }

            // Unclustered nodes stay eligible for the next level
            next.extend(singletons.into_iter().flatten());
            next.sort_unstable();
            frontier = next;
            level += 1;
        }

        tree.validate()?;
        info!(
            "Built tree {}: {} nodes, depth {}",
            tree_id,
            tree.len(),
            tree.depth()
        );
        Ok((tree, warnings))
    }

    async fn persist(&self, tree: &RaptorTree, user_id: &str, metadata: &Metadata) -> (usize, Vec<String>) {
        let mut stored = 0;
        let mut failures = Vec::new();
        for node in tree.nodes() {
            let mut payload = self.core.payload(user_id, &node.text, metadata);
            payload.insert(TREE_KEY.to_string(), json!(tree.tree_id));
            payload.insert(DOCUMENT_KEY.to_string(), json!(tree.tree_id));
            payload.insert(LEVEL_KEY.to_string(), json!(node.level));
            if let Some(chunk_id) = tree.leaf_chunk_id(node) {
                payload.insert(CHUNK_KEY.to_string(), json!(chunk_id));
            }
            payload.insert("parent".to_string(), json!(node.parent));
            payload.insert("children".to_string(), json!(node.children));
            match self
                .core
                .providers
                .upsert(&node.node_id, node.embedding.clone(), payload)
                .await
            {
                Ok(()) => stored += 1,
                Err(e) => failures.push(format!("{}: {e}", node.node_id)),
            }
        }
        (stored, failures)
    }
}

/// Deduplicate by id, best score first; ties prefer the lower level, then the id
#[must_use]
pub fn merge_levels(summaries: Vec<SearchHit>, leaves: Vec<SearchHit>, top_k: usize) -> Vec<RagSource> {
    let mut seen = HashSet::new();
    let mut merged: Vec<SearchHit> = summaries
        .into_iter()
        .chain(leaves)
        .filter(|hit| seen.insert(hit.id.clone()))
        .collect();
    let level_of = |hit: &SearchHit| hit.metadata.get("level").and_then(serde_json::Value::as_u64).unwrap_or(0);
    merged.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| level_of(a).cmp(&level_of(b)))
            .then_with(|| a.id.cmp(&b.id))
    });
    merged.truncate(top_k);
    merged.into_iter().map(SearchHit::into_source).collect()
}

#[async_trait]
impl RagStrategy for RaptorRag {
    fn config(&self) -> &RagConfig {
        &self.core.config
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "RAPTOR".to_string(),
            mode: self.core.config.mode,
            features: vec![
                "hierarchical_summaries".to_string(),
                "multi_level_retrieval".to_string(),
                "citations".to_string(),
            ],
            complexity: Tier::Medium,
            resource_usage: Tier::High,
        }
    }

    async fn store(&self, content: &str, user_id: &str, metadata: &Metadata) -> RagResult {
        let started = Instant::now();
        let mode = self.mode();
        if let Err(e) = StrategyCore::validate_request(content, user_id, "content") {
            return RagResult::failure(mode, e.to_string());
        }

        let (tree, warnings) = match self.build_tree(content, user_id).await {
            Ok(built) => built,
            Err(e) => return RagResult::failure(mode, e.to_string()).timed(started),
        };
        let (stored, failures) = self.persist(&tree, user_id, metadata).await;

        let mut result = if stored == 0 {
            RagResult::failure(mode, "no tree node could be stored")
        } else {
            RagResult::success(mode).with_content(format!(
                "Stored tree {} with {} node(s) across {} level(s)",
                tree.tree_id,
                stored,
                tree.depth() + 1
            ))
        };
        for warning in warnings.into_iter().chain(failures) {
            result.record_warning(warning);
        }
        result
            .with_metadata("tree_id", tree.tree_id.clone())
            .with_metadata("document_id", tree.tree_id.clone())
            .with_metadata("leaves", tree.level(0).count())
            .with_metadata("summaries", tree.len() - tree.level(0).count())
            .with_metadata("depth", tree.depth())
            .with_metadata("roots", tree.roots().count())
            .with_metadata("stored", stored)
            .timed(started)
    }

    async fn retrieve(&self, query: &str, user_id: &str, top_k: Option<usize>, filters: &Metadata) -> RagResult {
        let started = Instant::now();
        let mode = self.mode();
        if let Err(e) = StrategyCore::validate_request(query, user_id, "query") {
            return RagResult::failure(mode, e.to_string());
        }
        let top_k = self.core.top_k(top_k);

        let embedding = match self.core.providers.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => return RagResult::failure(mode, e.to_string()).timed(started),
        };

        // Leaves include chunks stored by the flat strategies
        let summary_filter = StrategyCore::scope(user_id, filters).with(LEVEL_KEY, Condition::AtLeast(1.0));
        let leaf_filter = StrategyCore::filter(user_id, filters);
        let (summaries, leaves) = futures::join!(
            self.core.providers.search(&embedding, &summary_filter, top_k),
            self.core.providers.search(&embedding, &leaf_filter, top_k * 2),
        );

        let mut warnings = Vec::new();
        let (summaries, leaves) = match (summaries, leaves) {
            (Err(a), Err(b)) => {
                return RagResult::failure(mode, format!("{a}; {b}")).timed(started);
            }
            (s, l) => {
                let summaries = s.unwrap_or_else(|e| {
                    warnings.push(format!("summary search failed: {e}"));
                    Vec::new()
                });
                let leaves = l.unwrap_or_else(|e| {
                    warnings.push(format!("leaf search failed: {e}"));
                    Vec::new()
                });
                (summaries, leaves)
            }
        };

        let leaves = dedupe_chunks(leaves, top_k);
        let summary_hits = summaries.len();
        let leaf_hits = leaves.len();
        let sources = merge_levels(summaries, leaves, top_k);
        debug!(
            "RAPTOR retrieval: {} summary + {} leaf hits -> {} sources",
            summary_hits,
            leaf_hits,
            sources.len()
        );

        let mut result = RagResult::success(mode)
            .with_sources(sources)
            .with_metadata("summary_hits", summary_hits)
            .with_metadata("leaf_hits", leaf_hits);
        for warning in warnings {
            warn!("RAPTOR retrieval degraded: {}", warning);
            result.record_warning(warning);
        }
        result.timed(started)
    }

    async fn generate(&self, query: &str, _user_id: &str, input: GenerationInput<'_>) -> RagResult {
        self.core.answer(query, input).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::models::RagMode;
    use crate::rag::strategy::GenerationSettings;
    use crate::tests::providers_with;
    use crate::tests::FailingGenerator;
    use crate::tests::PoisonEmbedder;
    use crate::tests::ScriptedGenerator;
    use crate::tests::TEST_DIMENSION;

    fn node(id: &str, level: u32, parent: Option<&str>, children: &[&str]) -> TreeNode {
        TreeNode {
            node_id: id.to_string(),
            text: id.to_string(),
            embedding: Vec::new(),
            level,
            parent: parent.map(str::to_string),
            children: children.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn raptor(generator: Arc<dyn crate::llm::TextGenerator>, threshold: f32) -> RaptorRag {
        raptor_with(Arc::new(HashEmbedder::new(TEST_DIMENSION)), generator, threshold)
    }

    fn raptor_with(
        embedder: Arc<dyn crate::embeddings::Embedder>,
        generator: Arc<dyn crate::llm::TextGenerator>,
        threshold: f32,
    ) -> RaptorRag {
        let config = RagConfig {
            chunk_size: 120,
            overlap: 0,
            top_k: 4,
            ..RagConfig::new(RagMode::Raptor)
        };
        let providers = providers_with(embedder, generator);
        RaptorRag::new(
            StrategyCore::new(config, providers, GenerationSettings::default()),
            RaptorConfig {
                cluster_threshold: threshold,
                ..RaptorConfig::default()
            },
        )
    }

    fn themed_document() -> String {
        let mut paragraphs = Vec::new();
        for i in 0..4 {
            paragraphs.push(format!(
                "Volcanoes erupt lava and ash; volcano eruption number {i} reshaped the island."
            ));
            paragraphs.push(format!(
                "Jazz musicians improvise melodies; jazz session number {i} filled the club."
            ));
        }
        paragraphs.join("\n\n")
    }

    #[test]
    fn test_cluster_by_similarity_is_greedy_and_ordered() {
        let embeddings = vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![0.99, 0.1],
            vec![0.1, 0.99],
            vec![-1.0, 0.0],
        ];
        let clusters = cluster_by_similarity(&embeddings, 0.9);
        assert_eq!(clusters, vec![vec![0, 2], vec![1, 3], vec![4]]);
        assert_eq!(cluster_by_similarity(&embeddings, 1.0).len(), 5);
        assert!(cluster_by_similarity(&[], 0.5).is_empty());
    }

    #[test]
    fn test_validate_rejects_asymmetric_and_cyclic_links() {
        let mut tree = RaptorTree::new("t");
        tree.push(node("a", 0, Some("p"), &[])).unwrap();
        tree.push(node("p", 1, None, &["a"])).unwrap();
        assert!(tree.validate().is_ok());
        assert_eq!(tree.ancestors("a"), vec!["p"]);

        let mut orphan = RaptorTree::new("t");
        orphan.push(node("a", 0, Some("missing"), &[])).unwrap();
        assert!(orphan.validate().is_err());

        let mut cyclic = RaptorTree::new("t");
        cyclic.push(node("x", 1, Some("y"), &["y"])).unwrap();
        cyclic.push(node("y", 1, Some("x"), &["x"])).unwrap();
        assert!(cyclic.validate().is_err());

        let mut duplicate = RaptorTree::new("t");
        duplicate.push(node("a", 0, None, &[])).unwrap();
        assert!(duplicate.push(node("a", 0, None, &[])).is_err());
    }

    #[tokio::test]
    async fn test_build_tree_groups_related_chunks() {
        let strategy = raptor(Arc::new(ScriptedGenerator::new("A summary of related passages.")), 0.3);
        let (tree, warnings) = strategy.build_tree(&themed_document(), "alice").await.unwrap();

        assert!(warnings.is_empty());
        assert_eq!(tree.level(0).count(), 8);
        assert!(tree.level(1).count() >= 1);
        for leaf in tree.level(0) {
            assert!(tree.ancestors(&leaf.node_id).len() <= tree.depth() as usize);
        }
        assert!(tree
            .nodes()
            .iter()
            .filter(|n| n.level == 1)
            .all(|n| n.children.len() >= 2));
    }

    #[tokio::test]
    async fn test_unembeddable_leaf_is_excluded() {
        let strategy = raptor_with(
            Arc::new(PoisonEmbedder::new("POISON")),
            Arc::new(ScriptedGenerator::new("A summary of related passages.")),
            0.3,
        );
        let document = format!(
            "{}\n\nPOISON paragraph that the embedder refuses to handle.",
            themed_document()
        );
        let (tree, warnings) = strategy.build_tree(&document, "alice").await.unwrap();

        assert_eq!(tree.level(0).count(), 8);
        assert!(tree.nodes().iter().all(|n| !n.text.contains("POISON")));
        assert!(warnings.iter().any(|w| w.contains("chunk-0008")));
        tree.validate().unwrap();
        let leaf = tree.level(0).next().unwrap();
        assert_eq!(tree.leaf_chunk_id(leaf), Some("chunk-0000"));
    }

    #[tokio::test]
    async fn test_single_chunk_document_is_single_leaf() {
        let strategy = raptor(Arc::new(ScriptedGenerator::new("unused")), 0.3);
        let (tree, _) = strategy.build_tree("One short paragraph.", "alice").await.unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.nodes()[0].is_root());
    }

    #[tokio::test]
    async fn test_summary_failures_leave_leaves_as_roots() {
        let strategy = raptor(Arc::new(FailingGenerator), 0.3);
        let (tree, warnings) = strategy.build_tree(&themed_document(), "alice").await.unwrap();
        assert_eq!(tree.level(1).count(), 0);
        assert_eq!(tree.roots().count(), 8);
        assert!(!warnings.is_empty());
    }

    #[tokio::test]
    async fn test_store_and_retrieve_both_levels() {
        let strategy = raptor(Arc::new(ScriptedGenerator::new("Volcano eruptions and lava summary.")), 0.3);
        let stored = strategy.store(&themed_document(), "alice", &Metadata::new()).await;
        assert!(stored.success, "{:?}", stored.error);
        assert_eq!(stored.metadata["leaves"], json!(8));

        let result = strategy
            .retrieve("volcano lava eruption", "alice", Some(8), &Metadata::new())
            .await;
        assert!(result.success);
        assert!(result.sources.len() <= 8);
        let levels: HashSet<u64> = result
            .sources
            .iter()
            .filter_map(|s| s.metadata.get("level").and_then(serde_json::Value::as_u64))
            .collect();
        assert!(levels.contains(&0));
        assert!(levels.contains(&1));
    }

    #[test]
    fn test_merge_levels_tie_break() {
        let hit = |id: &str, score: f32, level: u32| SearchHit {
            id: id.to_string(),
            text: id.to_string(),
            score,
            metadata: json!({ "level": level }).as_object().cloned().unwrap(),
        };
        let merged = merge_levels(
            vec![hit("s1", 0.8, 1), hit("b", 0.5, 1)],
            vec![hit("a", 0.8, 0), hit("s1", 0.8, 1), hit("c", 0.9, 0)],
            3,
        );
        let ids: Vec<&str> = merged.iter().filter_map(RagSource::id).collect();
        assert_eq!(ids, vec!["c", "a", "s1"]);
    }
}
