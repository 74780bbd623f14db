//! Content type to downloader mapping.

use std::collections::BTreeMap;

use crate::config::{ContentType, ModulesConfig};
use crate::download::announcements::AnnouncementsDownloader;
use crate::download::assignments::AssignmentsDownloader;
use crate::download::contract::{ContentDownloader, DownloaderContext};
use crate::download::discussions::DiscussionsDownloader;
use crate::download::files::FilesDownloader;
use crate::download::grades::GradesDownloader;
use crate::download::hybrid::HybridModulesDownloader;
use crate::download::modules::ModulesDownloader;
use crate::download::people::PeopleDownloader;
use crate::download::quizzes::QuizzesDownloader;

/// Builds a downloader from the shared context.
pub type DownloaderFactory =
    Box<dyn Fn(&DownloaderContext) -> Box<dyn ContentDownloader> + Send + Sync>;

/// Registry of downloader constructors, built once at startup.
#[derive(Default)]
pub struct DownloaderRegistry {
    factories: BTreeMap<ContentType, DownloaderFactory>,
}

impl DownloaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All eight content types. Modules use the hybrid resolver unless
    /// `modules.hybrid` is off.
    pub fn with_defaults(modules: &ModulesConfig) -> Self {
        let mut registry = Self::new();
        registry.register(ContentType::Announcements, |ctx| {
            Box::new(AnnouncementsDownloader::new(ctx.clone()))
        });
        registry.register(ContentType::Assignments, |ctx| {
            Box::new(AssignmentsDownloader::new(ctx.clone()))
        });
        registry.register(ContentType::Discussions, |ctx| {
            Box::new(DiscussionsDownloader::new(ctx.clone()))
        });
        registry.register(ContentType::Files, |ctx| {
            Box::new(FilesDownloader::new(ctx.clone()))
        });
        if modules.hybrid {
            registry.register(ContentType::Modules, |ctx| {
                Box::new(HybridModulesDownloader::new(ctx.clone()))
            });
        } else {
            registry.register(ContentType::Modules, |ctx| {
                Box::new(ModulesDownloader::new(ctx.clone()))
            });
        }
        registry.register(ContentType::Quizzes, |ctx| {
            Box::new(QuizzesDownloader::new(ctx.clone()))
        });
        registry.register(ContentType::Grades, |ctx| {
            Box::new(GradesDownloader::new(ctx.clone()))
        });
        registry.register(ContentType::People, |ctx| {
            Box::new(PeopleDownloader::new(ctx.clone()))
        });
        registry
    }

    /// Register or replace the constructor for `content_type`.
    pub fn register<F>(&mut self, content_type: ContentType, factory: F)
    where
        F: Fn(&DownloaderContext) -> Box<dyn ContentDownloader> + Send + Sync + 'static,
    {
        self.factories.insert(content_type, Box::new(factory));
    }

    pub fn contains(&self, content_type: ContentType) -> bool {
        self.factories.contains_key(&content_type)
    }

    pub fn create(
        &self,
        content_type: ContentType,
        ctx: &DownloaderContext,
    ) -> Option<Box<dyn ContentDownloader>> {
        self.factories.get(&content_type).map(|factory| factory(ctx))
    }

    pub fn content_types(&self) -> Vec<ContentType> {
        self.factories.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::contract::test_support::{api, context};
    use tempfile::TempDir;

    #[test]
    fn test_defaults_cover_every_type() {
        let registry = DownloaderRegistry::with_defaults(&ModulesConfig::default());
        for content_type in ContentType::ALL {
            assert!(registry.contains(content_type), "{} missing", content_type);
        }
    }

    #[test]
    fn test_created_downloader_matches_type() {
        let dir = TempDir::new().unwrap();
        let ctx = context(api("http://127.0.0.1:9"), dir.path());
        let registry = DownloaderRegistry::with_defaults(&ModulesConfig {
            hybrid: false,
            web_scraping: false,
        });

        let downloader = registry.create(ContentType::Modules, &ctx).unwrap();
        assert_eq!(downloader.content_type(), ContentType::Modules);
        assert_eq!(downloader.content_type_name(), "modules");
        assert!(DownloaderRegistry::new().create(ContentType::Files, &ctx).is_none());
    }
}
