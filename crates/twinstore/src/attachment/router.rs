//! # Read Routing
//!
//! Every read is answered by exactly one handle:
//!
//! | Operation | Handle |
//! |-----------|--------|
//! | `exists`, `copy_to_local_file` | filesystem, always |
//! | `path`, `url` | alternate if `display_from_alternate`, else filesystem |
//! | `public_url`, `expiring_url` | alternate, always |
//!
//! Routing to the alternate handle on an attachment built without one returns
//! [`TwinError::SecondaryUnavailable`].

use super::{Attachment, Owner};
use crate::error::{Result, TwinError};
use crate::handle::BackendHandle;
use crate::model::Style;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which handle answers `path` and `url`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Dual mode off: plain filesystem attachment.
    Default,
    /// Dual mode on, reads stay local.
    Primary,
    /// Dual mode on, reads come from the alternate store.
    Secondary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlOptions {
    /// Append `?{updated_at}` so caches see a new URL after each assignment.
    pub timestamp: bool,
}

impl UrlOptions {
    pub fn timestamped() -> Self {
        Self { timestamp: true }
    }
}

impl<R: Owner> Attachment<R> {
    pub fn route(&self) -> Route {
        if self.display_from_alternate() {
            Route::Secondary
        } else if self.use_multiple() {
            Route::Primary
        } else {
            Route::Default
        }
    }

    fn routed_handle(&self) -> Result<&BackendHandle> {
        match self.route() {
            Route::Default | Route::Primary => Ok(&self.primary),
            Route::Secondary => self.alternate_handle(),
        }
    }

    fn alternate_handle(&self) -> Result<&BackendHandle> {
        self.secondary
            .as_ref()
            .ok_or_else(|| TwinError::SecondaryUnavailable(self.name.clone()))
    }

    /// Whether `style` is stored locally. Without a file nothing exists.
    pub fn exists(&self, style: &Style) -> Result<bool> {
        self.check_style(style)?;
        if self.file.is_none() {
            return Ok(false);
        }
        let key = self.key_for(style)?;
        self.primary.exists(&key)
    }

    /// Copy `style` out of the filesystem store into `dest`.
    pub fn copy_to_local_file(&self, style: &Style, dest: &Path) -> Result<()> {
        let key = self.key_for(style)?;
        self.primary.copy_to_local_file(&key, dest)
    }

    /// Storage path of `style` on the routed handle, `None` without a file.
    pub fn path(&self, style: &Style) -> Result<Option<PathBuf>> {
        self.check_style(style)?;
        if self.file.is_none() {
            return Ok(None);
        }
        let key = self.key_for(style)?;
        Ok(Some(self.routed_handle()?.path(&key)))
    }

    /// Display URL of `style` on the routed handle, or the default URL while no
    /// file is attached.
    pub fn url(&self, style: &Style, options: UrlOptions) -> Result<String> {
        self.check_style(style)?;
        let Some(file) = self.file.as_ref() else {
            return Ok(self.default_url.replace(":style", style.as_str()));
        };
        let key = self.key_in(file, style);
        let url = self.routed_handle()?.url(&key);
        if options.timestamp {
            let separator = if url.contains('?') { '&' } else { '?' };
            Ok(format!("{url}{separator}{}", file.updated_at.timestamp()))
        } else {
            Ok(url)
        }
    }

    pub fn public_url(&self, style: &Style) -> Result<String> {
        let key = self.key_for(style)?;
        self.alternate_handle()?.public_url(&key)
    }

    pub fn expiring_url(&self, expires_in: Duration, style: &Style) -> Result<String> {
        let key = self.key_for(style)?;
        self.alternate_handle()?.expiring_url(&key, expires_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{renditions, Doc, TestEnv};
    use tempfile::TempDir;

    fn saved(env: &TestEnv, doc: &std::rc::Rc<Doc>) -> Attachment<Doc> {
        let mut attachment = env.attachment(doc);
        attachment.assign("a.png", None, renditions(b"img")).unwrap();
        attachment.save().unwrap();
        attachment
    }

    #[test]
    fn test_routes_for_each_policy_state() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let attachment = saved(&env, &doc);
        assert_eq!(attachment.route(), Route::Default);

        let env = TestEnv::new(true, false);
        let attachment = saved(&env, &doc);
        assert_eq!(attachment.route(), Route::Primary);

        let env = TestEnv::new(true, true);
        let attachment = saved(&env, &doc);
        assert_eq!(attachment.route(), Route::Secondary);
    }

    #[test]
    fn test_read_from_alternate_without_dual_write_stays_default() {
        let env = TestEnv::new(false, true);
        let doc = Doc::new(1);
        let attachment = saved(&env, &doc);
        assert_eq!(attachment.route(), Route::Default);
        assert!(attachment
            .url(&Style::original(), UrlOptions::default())
            .unwrap()
            .starts_with("/system/"));
    }

    #[test]
    fn test_url_follows_route() {
        let env = TestEnv::new(true, false);
        let doc = Doc::new(4);
        let attachment = saved(&env, &doc);
        let original = Style::original();

        assert_eq!(
            attachment.url(&original, UrlOptions::default()).unwrap(),
            "/system/avatars/4/original/a.png"
        );

        env.flags.set_read_from_alternate(true);
        assert_eq!(
            attachment.url(&original, UrlOptions::default()).unwrap(),
            "https://bucket.test/avatars/4/original/a.png"
        );
    }

    #[test]
    fn test_path_follows_route() {
        let env = TestEnv::new(true, true);
        let doc = Doc::new(4);
        let attachment = saved(&env, &doc);
        assert_eq!(
            attachment.path(&Style::new("thumbnail")).unwrap().unwrap(),
            PathBuf::from("avatars/4/thumbnail/a.png")
        );

        env.flags.set_read_from_alternate(false);
        let local = attachment.path(&Style::new("thumbnail")).unwrap().unwrap();
        assert!(local.starts_with(&env.root));
        assert!(local.is_file());
    }

    #[test]
    fn test_exists_ignores_alternate() {
        let env = TestEnv::new(true, true);
        let doc = Doc::new(1);
        let attachment = saved(&env, &doc);
        let key = attachment.key_for(&Style::original()).unwrap();
        std::fs::remove_file(attachment.filesystem().path(&key)).unwrap();

        assert!(env.remote.get(&key).is_some());
        assert!(!attachment.exists(&Style::original()).unwrap());
        assert!(attachment.exists(&Style::new("thumbnail")).unwrap());
    }

    #[test]
    fn test_copy_to_local_file_reads_filesystem() {
        let env = TestEnv::new(true, true);
        let doc = Doc::new(1);
        let attachment = saved(&env, &doc);
        let out = TempDir::new().unwrap();
        let dest = out.path().join("copy.png");

        attachment
            .copy_to_local_file(&Style::original(), &dest)
            .unwrap();
        assert_eq!(std::fs::read(dest).unwrap(), b"img");
    }

    #[test]
    fn test_public_and_expiring_urls_use_alternate() {
        let env = TestEnv::new(true, false);
        let doc = Doc::new(9);
        let attachment = saved(&env, &doc);
        let original = Style::original();

        assert_eq!(
            attachment.public_url(&original).unwrap(),
            "https://bucket.test/avatars/9/original/a.png"
        );
        let expiring = attachment
            .expiring_url(Duration::from_secs(300), &original)
            .unwrap();
        assert!(expiring.starts_with("https://bucket.test/avatars/9/original/a.png?expires="));
    }

    #[test]
    fn test_public_url_without_alternate_errors() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let attachment = saved(&env, &doc);
        assert!(matches!(
            attachment.public_url(&Style::original()),
            Err(TwinError::SecondaryUnavailable(_))
        ));
    }

    #[test]
    fn test_display_flag_on_attachment_built_without_alternate() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let attachment = saved(&env, &doc);
        env.flags.set_dual_write(true);
        env.flags.set_read_from_alternate(true);

        assert_eq!(attachment.route(), Route::Secondary);
        assert!(matches!(
            attachment.url(&Style::original(), UrlOptions::default()),
            Err(TwinError::SecondaryUnavailable(_))
        ));
    }

    #[test]
    fn test_default_url_without_file() {
        let env = TestEnv::new(true, true);
        let doc = Doc::new(1);
        let attachment = env.attachment(&doc);

        assert_eq!(
            attachment
                .url(&Style::new("thumbnail"), UrlOptions::default())
                .unwrap(),
            "/avatars/thumbnail/missing.png"
        );
        assert_eq!(attachment.path(&Style::original()).unwrap(), None);
        assert!(!attachment.exists(&Style::original()).unwrap());
    }

    #[test]
    fn test_timestamped_url() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let attachment = saved(&env, &doc);
        let stamp = attachment.file().unwrap().updated_at.timestamp();

        assert_eq!(
            attachment
                .url(&Style::original(), UrlOptions::timestamped())
                .unwrap(),
            format!("/system/avatars/1/original/a.png?{stamp}")
        );
    }

    #[test]
    fn test_unknown_style_is_rejected() {
        let env = TestEnv::new(false, false);
        let doc = Doc::new(1);
        let attachment = saved(&env, &doc);
        assert!(matches!(
            attachment.url(&Style::new("poster"), UrlOptions::default()),
            Err(TwinError::UnknownStyle { .. })
        ));
    }
}
