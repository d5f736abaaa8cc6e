//! 缓存存储：SQLite 表 + get_or_generate 门控
//!
//! 键为 (subject_id, kind)；每条记录带生成器标识与提示词版本，支持按版本选择性失效。

use std::future::Future;

use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::cache::validate::validate;
use crate::cache::{ArtifactContent, ArtifactKind, CacheError};
use crate::llm::LlmError;

/// 生成器产出：内容 + 来源标识 + 提示词版本
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub content: ArtifactContent,
    /// 生成后端标识（模型名）
    pub generator: String,
    /// 提示词模板版本
    pub version: String,
}

/// 缓存统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub count: i64,
    /// 全部条目的内容字节数之和
    pub total_size: i64,
}

/// 内容缓存：同一键只生成一次
pub struct ContentCache {
    pool: SqlitePool,
    max_binary_bytes: usize,
}

impl ContentCache {
    pub fn new(pool: SqlitePool, max_binary_bytes: usize) -> Self {
        Self {
            pool,
            max_binary_bytes,
        }
    }

    /// 初始化数据库表
    pub async fn init_tables(&self) -> Result<(), CacheError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                subject_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                content BLOB NOT NULL,
                format TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                generator TEXT NOT NULL,
                version TEXT NOT NULL,
                size INTEGER NOT NULL,
                PRIMARY KEY (subject_id, kind)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 只查不生成；未命中返回 None
    pub async fn get(
        &self,
        subject_id: i64,
        kind: ArtifactKind,
    ) -> Result<Option<ArtifactContent>, CacheError> {
        let row = sqlx::query("SELECT content FROM cache_entries WHERE subject_id = ? AND kind = ?")
            .bind(subject_id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| {
            let bytes: Vec<u8> = r.get("content");
            if kind.is_binary() {
                ArtifactContent::Binary(bytes)
            } else {
                ArtifactContent::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
        }))
    }

    /// 命中直接返回，不触发生成；未命中时调用 gen，产物过校验后落盘再返回。
    /// 生成或校验失败时不写任何数据，下次调用会重新尝试生成。
    pub async fn get_or_generate<F, Fut>(
        &self,
        subject_id: i64,
        kind: ArtifactKind,
        gen: F,
    ) -> Result<ArtifactContent, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<GeneratedArtifact, LlmError>>,
    {
        if let Some(content) = self.get(subject_id, kind).await? {
            tracing::debug!("cache hit: subject={} kind={}", subject_id, kind.as_str());
            return Ok(content);
        }

        tracing::info!(
            "cache miss, generating: subject={} kind={}",
            subject_id,
            kind.as_str()
        );
        let artifact = gen().await?;
        let format = validate(kind, &artifact.content, self.max_binary_bytes)?;

        sqlx::query(
            "INSERT OR REPLACE INTO cache_entries
                (subject_id, kind, content, format, generated_at, generator, version, size)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(subject_id)
        .bind(kind.as_str())
        .bind(artifact.content.as_bytes())
        .bind(format)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(&artifact.generator)
        .bind(&artifact.version)
        .bind(artifact.content.len() as i64)
        .execute(&self.pool)
        .await?;

        Ok(artifact.content)
    }

    /// 删除单个条目；返回是否确有删除
    pub async fn invalidate(
        &self,
        subject_id: i64,
        kind: ArtifactKind,
    ) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE subject_id = ? AND kind = ?")
            .bind(subject_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 删除某类产物的全部条目；返回删除数
    pub async fn invalidate_all(&self, kind: ArtifactKind) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE kind = ?")
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// 删除某类产物中指定提示词版本的条目（模板升级后只重做旧版本）
    pub async fn invalidate_by_version(
        &self,
        kind: ArtifactKind,
        version: &str,
    ) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE kind = ? AND version = ?")
            .bind(kind.as_str())
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count, COALESCE(SUM(size), 0) AS total_size FROM cache_entries",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(CacheStats {
            count: row.get("count"),
            total_size: row.get("total_size"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::llm::mock::tiny_png;

    async fn test_cache() -> (ContentCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::store::connect(&dir.path().join("cache.db"))
            .await
            .unwrap();
        let cache = ContentCache::new(pool, 1024 * 1024);
        cache.init_tables().await.unwrap();
        (cache, dir)
    }

    fn text_artifact(text: &str) -> GeneratedArtifact {
        GeneratedArtifact {
            content: ArtifactContent::Text(text.to_string()),
            generator: "mock".to_string(),
            version: "v1".to_string(),
        }
    }

    #[tokio::test]
    async fn second_call_never_invokes_generator() {
        let (cache, _dir) = test_cache().await;
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let content = cache
                .get_or_generate(7, ArtifactKind::Exposition, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(text_artifact("Fractions represent parts of a whole.")) }
                })
                .await
                .unwrap();
            assert_eq!(
                content.as_text().unwrap(),
                "Fractions represent parts of a whole."
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn corrupt_image_is_not_persisted() {
        let (cache, _dir) = test_cache().await;

        let err = cache
            .get_or_generate(3, ArtifactKind::Diagram, || async {
                Ok(GeneratedArtifact {
                    content: ArtifactContent::Binary(vec![0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 0, 0]),
                    generator: "mock-image".to_string(),
                    version: "v1".to_string(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Validation(_)));
        assert!(cache.get(3, ArtifactKind::Diagram).await.unwrap().is_none());

        // 文本路径不受图片失败影响
        let text = cache
            .get_or_generate(3, ArtifactKind::Exposition, || async {
                Ok(text_artifact("Angles in a triangle sum to 180 degrees."))
            })
            .await
            .unwrap();
        assert!(text.as_text().is_some());

        // 下次图片生成成功后正常落盘
        let png = cache
            .get_or_generate(3, ArtifactKind::Diagram, || async {
                Ok(GeneratedArtifact {
                    content: ArtifactContent::Binary(tiny_png()),
                    generator: "mock-image".to_string(),
                    version: "v1".to_string(),
                })
            })
            .await
            .unwrap();
        assert_eq!(png.as_bytes(), tiny_png().as_slice());
    }

    #[tokio::test]
    async fn oversized_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::store::connect(&dir.path().join("cache.db"))
            .await
            .unwrap();
        let cache = ContentCache::new(pool, 16);
        cache.init_tables().await.unwrap();

        let err = cache
            .get_or_generate(1, ArtifactKind::Diagram, || async {
                Ok(GeneratedArtifact {
                    content: ArtifactContent::Binary(tiny_png()),
                    generator: "mock-image".to_string(),
                    version: "v1".to_string(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Validation(_)));
        assert!(cache.get(1, ArtifactKind::Diagram).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_forces_regeneration() {
        let (cache, _dir) = test_cache().await;

        cache
            .get_or_generate(5, ArtifactKind::Exposition, || async {
                Ok(text_artifact("old explanation"))
            })
            .await
            .unwrap();
        assert!(cache.invalidate(5, ArtifactKind::Exposition).await.unwrap());
        assert!(!cache.invalidate(5, ArtifactKind::Exposition).await.unwrap());

        let fresh = cache
            .get_or_generate(5, ArtifactKind::Exposition, || async {
                Ok(text_artifact("new explanation"))
            })
            .await
            .unwrap();
        assert_eq!(fresh.as_text().unwrap(), "new explanation");
    }

    #[tokio::test]
    async fn invalidate_by_version_is_selective() {
        let (cache, _dir) = test_cache().await;

        cache
            .get_or_generate(1, ArtifactKind::Exposition, || async {
                Ok(GeneratedArtifact {
                    content: ArtifactContent::Text("v1 text".to_string()),
                    generator: "mock".to_string(),
                    version: "v1".to_string(),
                })
            })
            .await
            .unwrap();
        cache
            .get_or_generate(2, ArtifactKind::Exposition, || async {
                Ok(GeneratedArtifact {
                    content: ArtifactContent::Text("v2 text".to_string()),
                    generator: "mock".to_string(),
                    version: "v2".to_string(),
                })
            })
            .await
            .unwrap();

        let removed = cache
            .invalidate_by_version(ArtifactKind::Exposition, "v1")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get(1, ArtifactKind::Exposition).await.unwrap().is_none());
        assert!(cache.get(2, ArtifactKind::Exposition).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stats_reflect_entries() {
        let (cache, _dir) = test_cache().await;
        assert_eq!(cache.stats().await.unwrap().count, 0);

        cache
            .get_or_generate(9, ArtifactKind::Exposition, || async {
                Ok(text_artifact("hello"))
            })
            .await
            .unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.total_size, 5);
    }
}
