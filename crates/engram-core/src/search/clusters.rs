//! Topic clusters / "MemScene" (section 4.4)
//!
//! Online incremental clustering over record embeddings: attach to the
//! best matching centroid, update it by running average, or merge the two
//! most-similar clusters to make room when at capacity.

use chrono::Utc;

use crate::config::EngramConfig;
use crate::ids::new_id;
use crate::model::MemoryCluster;
use crate::store::Storage;
use crate::vectormath::{cosine_similarity, running_average, weighted_average};

/// Attach `embedding` (owned by `member_id`/`member_type`) to the best
/// matching cluster, or create a new one — merging the two most-similar
/// existing clusters first if at `maxClusters` capacity (section 4.4).
pub fn assign(
    store: &Storage,
    config: &EngramConfig,
    member_id: &str,
    member_type: &str,
    embedding: &[f32],
    keywords: &[String],
) -> crate::error::Result<String> {
    let mut clusters = store.all_clusters()?;

    let best = clusters
        .iter()
        .filter(|c| c.centroid.len() == embedding.len())
        .map(|c| (c.id.clone(), cosine_similarity(&c.centroid, embedding)))
        .fold(None, |acc: Option<(String, f32)>, (id, sim)| match acc {
            Some((_, best_sim)) if best_sim >= sim => acc,
            _ => Some((id, sim)),
        });

    if let Some((cluster_id, sim)) = best {
        if sim >= config.cluster_similarity_threshold {
            let cluster = clusters.iter_mut().find(|c| c.id == cluster_id).expect("found above");
            attach_member(cluster, member_id, member_type, embedding, keywords);
            store.update_cluster(cluster)?;
            return Ok(cluster.id.clone());
        }
    }

    if clusters.len() >= config.max_clusters {
        merge_two_most_similar(store, &mut clusters)?;
    }

    let now = Utc::now();
    let new_cluster = MemoryCluster {
        id: new_id("cluster"),
        centroid: embedding.to_vec(),
        member_ids: vec![member_id.to_string()],
        member_types: vec![member_type.to_string()],
        theme: keywords.first().cloned().unwrap_or_default(),
        keywords: keywords.to_vec(),
        last_timestamp: now,
        created_at: now,
        updated_at: now,
    };
    store.insert_cluster(&new_cluster)?;
    Ok(new_cluster.id)
}

fn attach_member(cluster: &mut MemoryCluster, member_id: &str, member_type: &str, embedding: &[f32], keywords: &[String]) {
    let n = cluster.member_ids.len();
    cluster.centroid = running_average(&cluster.centroid, n, embedding);
    cluster.member_ids.push(member_id.to_string());
    cluster.member_types.push(member_type.to_string());
    for kw in keywords {
        if !cluster.keywords.contains(kw) {
            cluster.keywords.push(kw.clone());
        }
    }
    cluster.keywords.truncate(20);
    cluster.last_timestamp = Utc::now();
    cluster.updated_at = Utc::now();
}

fn merge_two_most_similar(store: &Storage, clusters: &mut Vec<MemoryCluster>) -> crate::error::Result<()> {
    if clusters.len() < 2 {
        return Ok(());
    }
    let mut best_pair = (0usize, 1usize, f32::MIN);
    for i in 0..clusters.len() {
        for j in (i + 1)..clusters.len() {
            if clusters[i].centroid.len() != clusters[j].centroid.len() {
                continue;
            }
            let sim = cosine_similarity(&clusters[i].centroid, &clusters[j].centroid);
            if sim > best_pair.2 {
                best_pair = (i, j, sim);
            }
        }
    }
    let (i, j, _) = best_pair;
    let b = clusters.remove(j);
    let a = clusters.remove(i);

    let merged_centroid = weighted_average(&a.centroid, a.member_ids.len(), &b.centroid, b.member_ids.len());
    let mut member_ids = a.member_ids;
    member_ids.extend(b.member_ids);
    let mut member_types = a.member_types;
    member_types.extend(b.member_types);
    let mut keywords = a.keywords;
    for kw in b.keywords {
        if !keywords.contains(&kw) {
            keywords.push(kw);
        }
    }
    keywords.truncate(20);

    let merged = MemoryCluster {
        id: new_id("cluster"),
        centroid: merged_centroid,
        member_ids,
        member_types,
        theme: a.theme,
        keywords,
        last_timestamp: a.last_timestamp.max(b.last_timestamp),
        created_at: a.created_at.min(b.created_at),
        updated_at: Utc::now(),
    };

    store.delete_cluster(&a.id)?;
    store.delete_cluster(&b.id)?;
    store.insert_cluster(&merged)?;
    clusters.push(merged);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_creates_first_cluster() {
        let store = Storage::open_in_memory().unwrap();
        let config = EngramConfig::default();
        let id = assign(&store, &config, "fact-1", "fact", &[1.0, 0.0], &["rust".into()]).unwrap();
        let clusters = store.all_clusters().unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].id, id);
        assert_eq!(clusters[0].member_ids, vec!["fact-1"]);
    }

    #[test]
    fn assign_attaches_similar_member_and_updates_centroid() {
        let store = Storage::open_in_memory().unwrap();
        let config = EngramConfig::default();
        assign(&store, &config, "fact-1", "fact", &[1.0, 0.0], &["rust".into()]).unwrap();
        assign(&store, &config, "fact-2", "fact", &[0.95, 0.05], &["cargo".into()]).unwrap();

        let clusters = store.all_clusters().unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_ids.len(), 2);
        assert!(clusters[0].keywords.contains(&"cargo".to_string()));
    }

    #[test]
    fn assign_creates_new_cluster_when_dissimilar() {
        let store = Storage::open_in_memory().unwrap();
        let config = EngramConfig::default();
        assign(&store, &config, "fact-1", "fact", &[1.0, 0.0], &[]).unwrap();
        assign(&store, &config, "fact-2", "fact", &[0.0, 1.0], &[]).unwrap();

        let clusters = store.all_clusters().unwrap();
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn valid_clusters_excludes_singleton_members() {
        let store = Storage::open_in_memory().unwrap();
        let config = EngramConfig::default();
        assign(&store, &config, "fact-1", "fact", &[1.0, 0.0], &[]).unwrap();
        assign(&store, &config, "fact-2", "fact", &[0.0, 1.0], &[]).unwrap();
        assign(&store, &config, "fact-3", "fact", &[0.95, 0.05], &[]).unwrap();

        assert_eq!(store.all_clusters().unwrap().len(), 2);
        let valid = store.valid_clusters(config.min_cluster_size).unwrap();
        assert_eq!(valid.len(), 1);
        assert!(valid[0].member_ids.len() >= config.min_cluster_size);
    }

    #[test]
    fn merges_most_similar_pair_at_capacity() {
        let store = Storage::open_in_memory().unwrap();
        let mut config = EngramConfig::default();
        config.max_clusters = 2;
        config.cluster_similarity_threshold = 0.99;

        assign(&store, &config, "a", "fact", &[1.0, 0.0, 0.0], &[]).unwrap();
        assign(&store, &config, "b", "fact", &[0.0, 1.0, 0.0], &[]).unwrap();
        // at capacity (2 clusters) and orthogonal to both -> forces a merge
        // of the two existing clusters before a third is created.
        assign(&store, &config, "c", "fact", &[0.0, 0.0, 1.0], &[]).unwrap();

        let clusters = store.all_clusters().unwrap();
        assert_eq!(clusters.len(), 2);
        let total_members: usize = clusters.iter().map(|c| c.member_ids.len()).sum();
        assert_eq!(total_members, 3);
        assert!(clusters.iter().any(|c| c.member_ids.len() == 2));
    }
}
