use std::collections::{HashMap, VecDeque};

use docforge_core::document::WidgetModel;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// 截图时不参与签名计算的属性。
const TRANSIENT_PROPS: &[&str] = &["exportedImage"];

/// 导出图片缓存：内容签名到图片 data URL。超出容量时按插入顺序淘汰。
#[derive(Debug)]
pub struct ExportImageCache {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, String>,
}

impl Default for ExportImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ExportImageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, signature: &str) -> Option<String> {
        self.entries.get(signature).cloned()
    }

    /// 写入缓存。已存在的签名只更新图片，不改变淘汰顺序。
    pub fn insert(&mut self, signature: String, image: String) {
        if let Some(existing) = self.entries.get_mut(&signature) {
            *existing = image;
            return;
        }
        self.order.push_back(signature.clone());
        self.entries.insert(signature, image);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

/// 控件内容签名：类型、目标尺寸与去掉临时字段后的属性。
///
/// `serde_json::Map` 按键排序序列化，同样的内容总是得到同样的签名。
pub fn signature(widget: &WidgetModel) -> String {
    let mut props = widget.props.to_object();
    for key in TRANSIENT_PROPS {
        props.remove(*key);
    }
    let canonical = json!({
        "type": widget.kind().as_str(),
        "width": widget.size.width,
        "height": widget.size.height,
        "props": Value::Object(props),
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use docforge_core::document::{ChartType, ChartWidgetProps, WidgetProps};

    use super::*;

    fn chart(id: &str) -> WidgetModel {
        WidgetModel::new(id, WidgetProps::Chart(ChartWidgetProps::new(ChartType::Line)))
    }

    #[test]
    fn signature_ignores_id_and_exported_image() {
        let plain = chart("a");
        let mut exported = chart("b");
        if let Some(props) = exported.props.as_chart_mut() {
            props.exported_image = Some("data:image/png;base64,AAAA".to_string());
        }
        assert_eq!(signature(&plain), signature(&exported));
        assert_eq!(signature(&plain).len(), 64);
    }

    #[test]
    fn signature_tracks_size_and_props() {
        let base = chart("a");
        let resized = chart("a").with_size(10.0, 10.0);
        let mut retitled = chart("a");
        if let Some(props) = retitled.props.as_chart_mut() {
            props.title = Some("Revenue".to_string());
        }
        assert_ne!(signature(&base), signature(&resized));
        assert_ne!(signature(&base), signature(&retitled));
    }

    #[test]
    fn cache_evicts_oldest_entry_first() {
        let mut cache = ExportImageCache::new(2);
        cache.insert("a".to_string(), "1".to_string());
        cache.insert("b".to_string(), "2".to_string());
        cache.insert("a".to_string(), "1b".to_string());
        cache.insert("c".to_string(), "3".to_string());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b").as_deref(), Some("2"));
        assert_eq!(cache.get("c").as_deref(), Some("3"));

        cache.clear();
        assert!(cache.is_empty());
    }
}
