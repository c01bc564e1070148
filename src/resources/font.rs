use std::{cell::RefCell, rc::Rc};

use anyhow::bail;
use glyphon::{FontSystem, SwashCache, fontdb};

use crate::{
    error::WorldResult,
    resources::{LoadHandle, load_binary, spawn_load},
    tracker::Tracker,
};

/// Fonts available to text textures, plus the glyph rasterization cache.
pub struct FontLibrary {
    pub(crate) font_system: FontSystem,
    pub(crate) swash_cache: SwashCache,
    loaded: Vec<String>,
}

impl std::fmt::Debug for FontLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontLibrary")
            .field("faces", &self.font_system.db().len())
            .field("loaded", &self.loaded)
            .finish()
    }
}

impl Default for FontLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl FontLibrary {
    /// Starts out with the fonts installed on the system.
    pub fn new() -> Self {
        Self::from_font_system(FontSystem::new())
    }

    /// Starts out without any fonts.
    pub fn empty() -> Self {
        Self::from_font_system(FontSystem::new_with_locale_and_db(
            String::from("en-US"),
            fontdb::Database::new(),
        ))
    }

    fn from_font_system(font_system: FontSystem) -> Self {
        Self {
            font_system,
            swash_cache: SwashCache::new(),
            loaded: Vec::new(),
        }
    }

    /// Register font file contents (TTF, OTF or a collection). Data that
    /// yields no usable face is an error and leaves the library unchanged.
    pub fn load_font_data(&mut self, name: &str, data: Vec<u8>) -> anyhow::Result<()> {
        let before = self.face_count();
        self.font_system.db_mut().load_font_data(data);
        let added = self.face_count() - before;
        if added == 0 {
            bail!("{name} contains no readable font faces");
        }
        self.loaded.push(name.to_string());
        log::debug!("Font {} loaded with {} faces, {} available", name, added, self.face_count());
        Ok(())
    }

    pub fn face_count(&self) -> usize {
        self.font_system.db().len()
    }

    /// Fonts added through [`load_font_data`](Self::load_font_data), by name.
    pub fn loaded(&self) -> &[String] {
        &self.loaded
    }
}

/// Fetch the font at `url` into `fonts`, holding back readiness until it is
/// registered. Text using the font should be created once the handle resolves.
pub fn load_font(url: &str, tracker: &Tracker, fonts: &Rc<RefCell<FontLibrary>>) -> WorldResult<LoadHandle<()>> {
    let token = tracker.register(url)?;
    let fonts = fonts.clone();
    let url = url.to_string();
    Ok(spawn_load(token, tracker.load_timeout(), async move {
        let data = load_binary(&url).await?;
        fonts.borrow_mut().load_font_data(&url, data)
    }))
}
