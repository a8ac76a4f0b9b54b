use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::document::{
    DocumentMeta, DocumentModel, Metadata, Orientation, PageModel, SectionModel, SubsectionModel,
    WidgetModel, WidgetProps,
};
use crate::entity::{Entity, EntityPatch, EntityState};
use crate::geometry::{Position, Size};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subsection {
    pub id: String,
    pub section_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub subsection_id: String,
    pub number: u32,
    pub title: Option<String>,
    pub orientation: Orientation,
    pub background: Option<String>,
}

/// 规范化后的控件，额外带有所属页面 ID。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub page_id: String,
    pub props: WidgetProps,
    pub position: Position,
    pub size: Size,
    pub rotation: f64,
    pub z_index: i32,
    pub locked: bool,
    pub style: Option<Metadata>,
}

impl Entity for Section {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Subsection {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Page {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Widget {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Widget {
    pub fn from_model(page_id: &str, model: &WidgetModel) -> Self {
        Self {
            id: model.id.clone(),
            page_id: page_id.to_string(),
            props: model.props.clone(),
            position: model.position,
            size: model.size,
            rotation: model.rotation,
            z_index: model.z_index,
            locked: model.locked,
            style: model.style.clone(),
        }
    }

    /// 去掉 `page_id` 反向引用，还原为嵌套形态。
    pub fn to_model(&self) -> WidgetModel {
        WidgetModel {
            id: self.id.clone(),
            props: self.props.clone(),
            position: self.position,
            size: self.size,
            rotation: self.rotation,
            z_index: self.z_index,
            locked: self.locked,
            style: self.style.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionPatch {
    pub title: Option<String>,
}

impl EntityPatch<Section> for SectionPatch {
    fn apply_to(&self, entity: &mut Section) {
        if let Some(title) = &self.title {
            entity.title = title.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubsectionPatch {
    pub title: Option<String>,
}

impl EntityPatch<Subsection> for SubsectionPatch {
    fn apply_to(&self, entity: &mut Subsection) {
        if let Some(title) = &self.title {
            entity.title = title.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PagePatch {
    pub title: Option<Option<String>>,
    pub number: Option<u32>,
    pub orientation: Option<Orientation>,
    pub background: Option<Option<String>>,
}

impl EntityPatch<Page> for PagePatch {
    fn apply_to(&self, entity: &mut Page) {
        if let Some(title) = &self.title {
            entity.title = title.clone();
        }
        if let Some(number) = self.number {
            entity.number = number;
        }
        if let Some(orientation) = self.orientation {
            entity.orientation = orientation;
        }
        if let Some(background) = &self.background {
            entity.background = background.clone();
        }
    }
}

/// 控件属性的修改方式。
#[derive(Debug, Clone, PartialEq)]
pub enum PropsChange {
    /// 顶层键浅合并。
    Merge(Metadata),
    /// 整体替换，撤销时用于精确还原。
    Replace(WidgetProps),
}

impl PropsChange {
    fn resolve(&self, current: &WidgetProps) -> Option<WidgetProps> {
        match self {
            PropsChange::Merge(patch) => current.merged(patch),
            PropsChange::Replace(props) => Some(props.clone()),
        }
    }
}

/// 控件的部分修改。`page_id` 表示跨页移动，由 [`NormalizedDocumentState::update_widget`]
/// 显式维护页面的控件数组，不参与浅合并。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WidgetPatch {
    pub page_id: Option<String>,
    /// 跨页移动时在目标页面中的位置；缺省或越界时追加到末尾。
    pub page_index: Option<usize>,
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub rotation: Option<f64>,
    pub z_index: Option<i32>,
    pub locked: Option<bool>,
    pub style: Option<Option<Metadata>>,
    pub props: Option<PropsChange>,
}

impl WidgetPatch {
    pub fn props(patch: Metadata) -> Self {
        Self {
            props: Some(PropsChange::Merge(patch)),
            ..Self::default()
        }
    }

    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn size(size: Size) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    pub fn move_to_page(page_id: impl Into<String>) -> Self {
        Self {
            page_id: Some(page_id.into()),
            ..Self::default()
        }
    }

    /// 生成能把控件完整还原为 `widget` 的修改。
    pub fn restore(widget: &Widget) -> Self {
        Self {
            page_id: Some(widget.page_id.clone()),
            position: Some(widget.position),
            size: Some(widget.size),
            rotation: Some(widget.rotation),
            z_index: Some(widget.z_index),
            locked: Some(widget.locked),
            style: Some(widget.style.clone()),
            props: Some(PropsChange::Replace(widget.props.clone())),
            page_index: None,
        }
    }

    /// 同 [`WidgetPatch::restore`]，并在跨页还原时放回原页面的第 `index` 位。
    pub fn restore_at(widget: &Widget, index: usize) -> Self {
        Self {
            page_index: Some(index),
            ..Self::restore(widget)
        }
    }

    /// 只修改属性、不涉及几何或归属的修改可以被连续合并。
    pub fn is_props_only(&self) -> bool {
        self.props.is_some()
            && self.page_id.is_none()
            && self.page_index.is_none()
            && self.position.is_none()
            && self.size.is_none()
            && self.rotation.is_none()
            && self.z_index.is_none()
            && self.locked.is_none()
            && self.style.is_none()
    }

    /// 把后一次修改叠加到当前修改上，后者优先。
    pub fn absorb(&mut self, later: WidgetPatch) {
        if later.page_id.is_some() {
            self.page_id = later.page_id;
            self.page_index = later.page_index;
        }
        if later.position.is_some() {
            self.position = later.position;
        }
        if later.size.is_some() {
            self.size = later.size;
        }
        if later.rotation.is_some() {
            self.rotation = later.rotation;
        }
        if later.z_index.is_some() {
            self.z_index = later.z_index;
        }
        if later.locked.is_some() {
            self.locked = later.locked;
        }
        if later.style.is_some() {
            self.style = later.style;
        }
        match (self.props.as_mut(), later.props) {
            (Some(PropsChange::Merge(current)), Some(PropsChange::Merge(next))) => {
                current.extend(next);
            }
            (_, Some(next)) => self.props = Some(next),
            (_, None) => {}
        }
    }
}

impl EntityPatch<Widget> for WidgetPatch {
    fn apply_to(&self, entity: &mut Widget) {
        if let Some(position) = self.position {
            entity.position = position;
        }
        if let Some(size) = self.size {
            entity.size = size;
        }
        if let Some(rotation) = self.rotation {
            entity.rotation = rotation;
        }
        if let Some(z_index) = self.z_index {
            entity.z_index = z_index;
        }
        if let Some(locked) = self.locked {
            entity.locked = locked;
        }
        if let Some(style) = &self.style {
            entity.style = style.clone();
        }
        if let Some(props) = self.props.as_ref().and_then(|c| c.resolve(&entity.props)) {
            entity.props = props;
        }
    }
}

/// 关系完整性检查发现的问题。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// 关系数组引用了集合中不存在的实体。
    DanglingReference { relation: &'static str, id: String },
    /// 实体存在，但没有被父级的关系数组引用。
    Orphan { kind: &'static str, id: String },
    /// 实体记录的父 ID 与其所在数组的键不一致。
    ParentMismatch {
        kind: &'static str,
        id: String,
        indexed_under: String,
        recorded_parent: String,
    },
    /// 同一 ID 在关系数组中出现多次。
    DuplicateReference { relation: &'static str, id: String },
}

/// 文档的规范化存储：五个集合加上表达父子顺序的 ID 数组。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedDocumentState {
    meta: Option<DocumentMeta>,
    sections: EntityState<Section>,
    subsections: EntityState<Subsection>,
    pages: EntityState<Page>,
    widgets: EntityState<Widget>,
    section_ids: Vec<String>,
    subsection_ids_by_section_id: HashMap<String, Vec<String>>,
    page_ids_by_subsection_id: HashMap<String, Vec<String>>,
    widget_ids_by_page_id: HashMap<String, Vec<String>>,
}

/// 将嵌套文档规范化。
pub fn normalize(document: &DocumentModel) -> NormalizedDocumentState {
    NormalizedDocumentState::from_document(document)
}

/// 由规范化状态重建嵌套文档；尚未加载文档时返回 `None`。
pub fn denormalize(state: &NormalizedDocumentState) -> Option<DocumentModel> {
    state.to_document()
}

impl NormalizedDocumentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按 sections → subsections → pages → widgets 的遍历顺序构建全部集合与关系数组。
    pub fn from_document(document: &DocumentModel) -> Self {
        let mut flat = Flattened::default();
        for section in &document.sections {
            flat.section(section);
        }

        let mut state = Self {
            meta: Some(document.meta()),
            section_ids: flat.sections.iter().map(|s| s.id.clone()).collect(),
            ..Self::default()
        };
        state.sections.set_all(flat.sections);
        state.subsections.set_all(flat.subsections);
        state.pages.set_all(flat.pages);
        state.widgets.set_all(flat.widgets);
        state.subsection_ids_by_section_id = flat.subsection_ids_by_section_id.into_iter().collect();
        state.page_ids_by_subsection_id = flat.page_ids_by_subsection_id.into_iter().collect();
        state.widget_ids_by_page_id = flat.widget_ids_by_page_id.into_iter().collect();
        state
    }

    pub fn to_document(&self) -> Option<DocumentModel> {
        let meta = self.meta.as_ref()?;
        let sections = self
            .section_ids
            .iter()
            .filter_map(|id| self.sections.get(id))
            .map(|section| SectionModel {
                id: section.id.clone(),
                title: section.title.clone(),
                subsections: self
                    .subsection_ids(&section.id)
                    .iter()
                    .filter_map(|id| self.subsection_model(id))
                    .collect(),
            })
            .collect();
        Some(DocumentModel::from_parts(meta.clone(), sections))
    }

    fn subsection_model(&self, id: &str) -> Option<SubsectionModel> {
        let subsection = self.subsections.get(id)?;
        Some(SubsectionModel {
            id: subsection.id.clone(),
            title: subsection.title.clone(),
            pages: self
                .page_ids(id)
                .iter()
                .filter_map(|page_id| self.page_model(page_id))
                .collect(),
        })
    }

    fn page_model(&self, id: &str) -> Option<PageModel> {
        let page = self.pages.get(id)?;
        Some(PageModel {
            id: page.id.clone(),
            number: page.number,
            title: page.title.clone(),
            orientation: page.orientation,
            background: page.background.clone(),
            widgets: self
                .widget_ids(id)
                .iter()
                .filter_map(|widget_id| self.widgets.get(widget_id))
                .map(Widget::to_model)
                .collect(),
        })
    }

    #[inline]
    pub fn meta(&self) -> Option<&DocumentMeta> {
        self.meta.as_ref()
    }

    #[inline]
    pub fn sections(&self) -> &EntityState<Section> {
        &self.sections
    }

    #[inline]
    pub fn subsections(&self) -> &EntityState<Subsection> {
        &self.subsections
    }

    #[inline]
    pub fn pages(&self) -> &EntityState<Page> {
        &self.pages
    }

    #[inline]
    pub fn widgets(&self) -> &EntityState<Widget> {
        &self.widgets
    }

    #[inline]
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.get(id)
    }

    #[inline]
    pub fn subsection(&self, id: &str) -> Option<&Subsection> {
        self.subsections.get(id)
    }

    #[inline]
    pub fn page(&self, id: &str) -> Option<&Page> {
        self.pages.get(id)
    }

    #[inline]
    pub fn widget(&self, id: &str) -> Option<&Widget> {
        self.widgets.get(id)
    }

    #[inline]
    pub fn section_ids(&self) -> &[String] {
        &self.section_ids
    }

    pub fn subsection_ids(&self, section_id: &str) -> &[String] {
        self.subsection_ids_by_section_id
            .get(section_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn page_ids(&self, subsection_id: &str) -> &[String] {
        self.page_ids_by_subsection_id
            .get(subsection_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn widget_ids(&self, page_id: &str) -> &[String] {
        self.widget_ids_by_page_id
            .get(page_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 整体替换文档元信息。
    pub fn set_meta(&mut self, meta: DocumentMeta) {
        self.meta = Some(meta);
    }

    /// 修改文档元信息；尚未加载文档时返回 `false`。
    pub fn update_meta(&mut self, update: impl FnOnce(&mut DocumentMeta)) -> bool {
        match self.meta.as_mut() {
            Some(meta) => {
                update(meta);
                true
            }
            None => false,
        }
    }

    /// 插入章节及其携带的整棵子树。子树中任一 ID 已存在时整体忽略。
    pub fn insert_section(&mut self, section: &SectionModel, index: Option<usize>) -> bool {
        let mut flat = Flattened::default();
        flat.section(section);
        if !self.absorb(flat) {
            return false;
        }
        insert_at(&mut self.section_ids, section.id.clone(), index);
        true
    }

    pub fn insert_subsection(
        &mut self,
        section_id: &str,
        subsection: &SubsectionModel,
        index: Option<usize>,
    ) -> bool {
        if !self.sections.contains(section_id) {
            return false;
        }
        let mut flat = Flattened::default();
        flat.subsection(section_id, subsection);
        if !self.absorb(flat) {
            return false;
        }
        let siblings = self
            .subsection_ids_by_section_id
            .entry(section_id.to_string())
            .or_default();
        insert_at(siblings, subsection.id.clone(), index);
        true
    }

    pub fn insert_page(
        &mut self,
        subsection_id: &str,
        page: &PageModel,
        index: Option<usize>,
    ) -> bool {
        if !self.subsections.contains(subsection_id) {
            return false;
        }
        let mut flat = Flattened::default();
        flat.page(subsection_id, page);
        if !self.absorb(flat) {
            return false;
        }
        let siblings = self
            .page_ids_by_subsection_id
            .entry(subsection_id.to_string())
            .or_default();
        insert_at(siblings, page.id.clone(), index);
        true
    }

    pub fn insert_widget(
        &mut self,
        page_id: &str,
        widget: &WidgetModel,
        index: Option<usize>,
    ) -> bool {
        if !self.pages.contains(page_id) || self.widgets.contains(&widget.id) {
            return false;
        }
        self.widgets.add_one(Widget::from_model(page_id, widget));
        let siblings = self
            .widget_ids_by_page_id
            .entry(page_id.to_string())
            .or_default();
        insert_at(siblings, widget.id.clone(), index);
        true
    }

    /// 级联删除章节：先求出全部后代 ID，再从所有集合与关系数组中移除。
    pub fn remove_section(&mut self, section_id: &str) -> bool {
        if !self.sections.contains(section_id) {
            return false;
        }
        let mut doomed = Descendants::default();
        for subsection_id in self.subsection_ids(section_id) {
            self.collect_subsection(subsection_id, &mut doomed);
        }
        self.purge(&doomed);
        self.subsection_ids_by_section_id.remove(section_id);
        self.sections.remove_one(section_id);
        self.section_ids.retain(|id| id != section_id);
        true
    }

    pub fn remove_subsection(&mut self, subsection_id: &str) -> bool {
        let Some(section_id) = self
            .subsections
            .get(subsection_id)
            .map(|s| s.section_id.clone())
        else {
            return false;
        };
        let mut doomed = Descendants::default();
        self.collect_subsection(subsection_id, &mut doomed);
        self.purge(&doomed);
        if let Some(siblings) = self.subsection_ids_by_section_id.get_mut(&section_id) {
            siblings.retain(|id| id != subsection_id);
        }
        true
    }

    pub fn remove_page(&mut self, page_id: &str) -> bool {
        let Some(subsection_id) = self.pages.get(page_id).map(|p| p.subsection_id.clone()) else {
            return false;
        };
        let mut doomed = Descendants::default();
        self.collect_page(page_id, &mut doomed);
        self.purge(&doomed);
        if let Some(siblings) = self.page_ids_by_subsection_id.get_mut(&subsection_id) {
            siblings.retain(|id| id != page_id);
        }
        true
    }

    /// 删除控件。页面不存在，或控件不属于该页面时不做修改。
    pub fn remove_widget(&mut self, page_id: &str, widget_id: &str) -> bool {
        let belongs = self
            .widgets
            .get(widget_id)
            .is_some_and(|widget| widget.page_id == page_id);
        if !self.pages.contains(page_id) || !belongs {
            return false;
        }
        self.widgets.remove_one(widget_id);
        if let Some(siblings) = self.widget_ids_by_page_id.get_mut(page_id) {
            siblings.retain(|id| id != widget_id);
        }
        true
    }

    pub fn update_section(&mut self, section_id: &str, patch: &SectionPatch) -> bool {
        self.sections.update_one(section_id, patch)
    }

    pub fn update_subsection(&mut self, subsection_id: &str, patch: &SubsectionPatch) -> bool {
        self.subsections.update_one(subsection_id, patch)
    }

    pub fn update_page(&mut self, page_id: &str, patch: &PagePatch) -> bool {
        self.pages.update_one(page_id, patch)
    }

    /// 修改控件。
    ///
    /// `patch.page_id` 指向其他页面时，控件 ID 会从原页面数组移除并插入目标页面数组的
    /// `patch.page_index` 位（缺省为末尾）；目标页面不存在或属性合并不合法时整体忽略。
    pub fn update_widget(&mut self, widget_id: &str, patch: &WidgetPatch) -> bool {
        let Some(current) = self.widgets.get(widget_id) else {
            return false;
        };
        if let Some(change) = &patch.props {
            if change.resolve(&current.props).is_none() {
                return false;
            }
        }
        let old_page_id = current.page_id.clone();
        let target_page = patch
            .page_id
            .as_ref()
            .filter(|target| **target != old_page_id)
            .cloned();
        if let Some(target) = &target_page {
            if !self.pages.contains(target) {
                return false;
            }
        }

        self.widgets.update_one(widget_id, patch);

        if let Some(target) = target_page {
            if let Some(siblings) = self.widget_ids_by_page_id.get_mut(&old_page_id) {
                siblings.retain(|id| id != widget_id);
            }
            let siblings = self.widget_ids_by_page_id.entry(target.clone()).or_default();
            insert_at(siblings, widget_id.to_string(), patch.page_index);
            if let Some(widget) = self.widgets.get_mut(widget_id) {
                widget.page_id = target;
            }
        }
        true
    }

    /// 检查集合与关系数组是否一致，返回全部问题；一致时为空。
    pub fn integrity_violations(&self) -> Vec<IntegrityViolation> {
        let mut violations = Vec::new();

        let mut seen = HashSet::new();
        for id in &self.section_ids {
            if !seen.insert(id.as_str()) {
                violations.push(IntegrityViolation::DuplicateReference {
                    relation: "section_ids",
                    id: id.clone(),
                });
            }
            if !self.sections.contains(id) {
                violations.push(IntegrityViolation::DanglingReference {
                    relation: "section_ids",
                    id: id.clone(),
                });
            }
        }
        for section in self.sections.iter() {
            if !seen.contains(section.id.as_str()) {
                violations.push(IntegrityViolation::Orphan {
                    kind: "section",
                    id: section.id.clone(),
                });
            }
        }

        check_relation(
            &mut violations,
            "subsection_ids_by_section_id",
            "subsection",
            &self.subsection_ids_by_section_id,
            &self.sections,
            &self.subsections,
            |subsection| subsection.section_id.as_str(),
        );
        check_relation(
            &mut violations,
            "page_ids_by_subsection_id",
            "page",
            &self.page_ids_by_subsection_id,
            &self.subsections,
            &self.pages,
            |page| page.subsection_id.as_str(),
        );
        check_relation(
            &mut violations,
            "widget_ids_by_page_id",
            "widget",
            &self.widget_ids_by_page_id,
            &self.pages,
            &self.widgets,
            |widget| widget.page_id.as_str(),
        );

        violations
    }

    fn collect_subsection(&self, subsection_id: &str, doomed: &mut Descendants) {
        doomed.subsections.push(subsection_id.to_string());
        for page_id in self.page_ids(subsection_id) {
            self.collect_page(page_id, doomed);
        }
    }

    fn collect_page(&self, page_id: &str, doomed: &mut Descendants) {
        doomed.pages.push(page_id.to_string());
        doomed
            .widgets
            .extend(self.widget_ids(page_id).iter().cloned());
    }

    fn purge(&mut self, doomed: &Descendants) {
        self.widgets
            .remove_many(doomed.widgets.iter().map(String::as_str));
        self.pages.remove_many(doomed.pages.iter().map(String::as_str));
        self.subsections
            .remove_many(doomed.subsections.iter().map(String::as_str));
        for page_id in &doomed.pages {
            self.widget_ids_by_page_id.remove(page_id);
        }
        for subsection_id in &doomed.subsections {
            self.page_ids_by_subsection_id.remove(subsection_id);
        }
    }

    /// 合并一棵已展开的子树。存在 ID 冲突时不做修改并返回 `false`。
    fn absorb(&mut self, flat: Flattened) -> bool {
        if self.collides(&flat) {
            return false;
        }
        for section in flat.sections {
            self.sections.add_one(section);
        }
        for subsection in flat.subsections {
            self.subsections.add_one(subsection);
        }
        for page in flat.pages {
            self.pages.add_one(page);
        }
        for widget in flat.widgets {
            self.widgets.add_one(widget);
        }
        self.subsection_ids_by_section_id
            .extend(flat.subsection_ids_by_section_id);
        self.page_ids_by_subsection_id
            .extend(flat.page_ids_by_subsection_id);
        self.widget_ids_by_page_id.extend(flat.widget_ids_by_page_id);
        true
    }

    fn collides(&self, flat: &Flattened) -> bool {
        let mut fresh = HashSet::new();
        flat.sections
            .iter()
            .any(|s| self.sections.contains(&s.id) || !fresh.insert(("section", s.id.as_str())))
            || flat.subsections.iter().any(|s| {
                self.subsections.contains(&s.id) || !fresh.insert(("subsection", s.id.as_str()))
            })
            || flat
                .pages
                .iter()
                .any(|p| self.pages.contains(&p.id) || !fresh.insert(("page", p.id.as_str())))
            || flat
                .widgets
                .iter()
                .any(|w| self.widgets.contains(&w.id) || !fresh.insert(("widget", w.id.as_str())))
    }
}

#[derive(Default)]
struct Descendants {
    subsections: Vec<String>,
    pages: Vec<String>,
    widgets: Vec<String>,
}

/// 嵌套子树展开后的实体与关系数组，保持遍历顺序。
#[derive(Default)]
struct Flattened {
    sections: Vec<Section>,
    subsections: Vec<Subsection>,
    pages: Vec<Page>,
    widgets: Vec<Widget>,
    subsection_ids_by_section_id: Vec<(String, Vec<String>)>,
    page_ids_by_subsection_id: Vec<(String, Vec<String>)>,
    widget_ids_by_page_id: Vec<(String, Vec<String>)>,
}

impl Flattened {
    fn section(&mut self, section: &SectionModel) {
        self.sections.push(Section {
            id: section.id.clone(),
            title: section.title.clone(),
        });
        let children = section.subsections.iter().map(|s| s.id.clone()).collect();
        self.subsection_ids_by_section_id
            .push((section.id.clone(), children));
        for subsection in &section.subsections {
            self.subsection(&section.id, subsection);
        }
    }

    fn subsection(&mut self, section_id: &str, subsection: &SubsectionModel) {
        self.subsections.push(Subsection {
            id: subsection.id.clone(),
            section_id: section_id.to_string(),
            title: subsection.title.clone(),
        });
        let children = subsection.pages.iter().map(|p| p.id.clone()).collect();
        self.page_ids_by_subsection_id
            .push((subsection.id.clone(), children));
        for page in &subsection.pages {
            self.page(&subsection.id, page);
        }
    }

    fn page(&mut self, subsection_id: &str, page: &PageModel) {
        self.pages.push(Page {
            id: page.id.clone(),
            subsection_id: subsection_id.to_string(),
            number: page.number,
            title: page.title.clone(),
            orientation: page.orientation,
            background: page.background.clone(),
        });
        let children = page.widgets.iter().map(|w| w.id.clone()).collect();
        self.widget_ids_by_page_id.push((page.id.clone(), children));
        for widget in &page.widgets {
            self.widgets.push(Widget::from_model(&page.id, widget));
        }
    }
}

fn insert_at(ids: &mut Vec<String>, id: String, index: Option<usize>) {
    match index {
        Some(index) if index < ids.len() => ids.insert(index, id),
        _ => ids.push(id),
    }
}

fn check_relation<P: Entity, C: Entity>(
    violations: &mut Vec<IntegrityViolation>,
    relation: &'static str,
    kind: &'static str,
    map: &HashMap<String, Vec<String>>,
    parents: &EntityState<P>,
    children: &EntityState<C>,
    parent_of: impl Fn(&C) -> &str,
) {
    let mut seen: HashSet<&str> = HashSet::new();
    for (parent_id, child_ids) in map {
        if !parents.contains(parent_id) {
            violations.push(IntegrityViolation::DanglingReference {
                relation,
                id: parent_id.clone(),
            });
        }
        for child_id in child_ids {
            if !seen.insert(child_id.as_str()) {
                violations.push(IntegrityViolation::DuplicateReference {
                    relation,
                    id: child_id.clone(),
                });
            }
            match children.get(child_id) {
                None => violations.push(IntegrityViolation::DanglingReference {
                    relation,
                    id: child_id.clone(),
                }),
                Some(child) if parent_of(child) != parent_id => {
                    violations.push(IntegrityViolation::ParentMismatch {
                        kind,
                        id: child_id.clone(),
                        indexed_under: parent_id.clone(),
                        recorded_parent: parent_of(child).to_string(),
                    });
                }
                Some(_) => {}
            }
        }
    }
    for child in children.iter() {
        if !seen.contains(child.id()) {
            violations.push(IntegrityViolation::Orphan {
                kind,
                id: child.id().to_string(),
            });
        }
    }
}
