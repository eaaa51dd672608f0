//! 分页模块
//!
//! 包含分页参数解析、分页信息计算、页码窗口计算以及分页导航条的数据模型

use serde::{Deserialize, Serialize};

use crate::config::PaginationConfig;

/// 默认可见页码数量
pub const DEFAULT_WINDOW_SIZE: i64 = 5;

/// 分页查询参数结构体
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// 页码，默认为1
    pub page: Option<i64>,
    /// 每页数量，默认值和上限来自配置
    pub per_page: Option<i64>,
}

/// 分页信息结构体
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    /// 当前页码
    pub current_page: i64,
    /// 每页数量
    pub per_page: i64,
    /// 总记录数
    pub total: i64,
    /// 总页数
    pub total_pages: i64,
    /// 是否有上一页
    pub has_prev: bool,
    /// 是否有下一页
    pub has_next: bool,
}

impl PageQuery {
    // 若用户传入的 page ≤ 0，则统一视为第 1 页
    pub fn get_page(&self) -> i64 {
        self.page.filter(|&p| p > 0).unwrap_or(1)
    }

    /// 获取处理后的每页数量，确保在 [1, max_per_page] 范围内
    pub fn get_per_page(&self, config: &PaginationConfig) -> i64 {
        self.per_page
            .unwrap_or(config.default_per_page)
            .clamp(1, config.max_per_page.max(1))
    }

    /// 计算偏移量
    pub fn get_offset(&self, config: &PaginationConfig) -> i64 {
        (self.get_page() - 1) * self.get_per_page(config)
    }

    /// 根据总记录数生成分页信息
    ///
    /// 页码超过总页数时回落到最后一页，保证后续查询的偏移量有效
    pub fn resolve(&self, config: &PaginationConfig, total: i64) -> Pagination {
        let per_page = self.get_per_page(config);
        let total_pages = total_pages_for(total, per_page);
        let page = self.get_page().min(total_pages.max(1));

        create_pagination(page, per_page, total)
    }
}

impl Pagination {
    /// 当前页对应的 SQL 偏移量
    pub fn offset(&self) -> i64 {
        (self.current_page.max(1) - 1) * self.per_page
    }
}

fn total_pages_for(total: i64, per_page: i64) -> i64 {
    if per_page <= 0 {
        return 0;
    }
    let total = total.max(0);
    (total + per_page - 1) / per_page
}

/// 创建分页信息
///
/// # 参数
/// * `page` - 当前页码
/// * `per_page` - 每页数量
/// * `total` - 总记录数
///
/// # 返回值
/// 构建好的Pagination结构体，`per_page` 为 0 时总页数为 0
pub fn create_pagination(page: i64, per_page: i64, total: i64) -> Pagination {
    let total_pages = total_pages_for(total, per_page);

    Pagination {
        current_page: page,
        per_page,
        total,
        total_pages,
        has_prev: page > 1,
        has_next: page < total_pages,
    }
}

/// 计算显示范围
///
/// # 参数
/// * `page` - 当前页码
/// * `per_page` - 每页数量
/// * `current_count` - 当前页实际记录数
///
/// # 返回值
/// (start_item, end_item) - 从 1 开始的闭区间，空页返回 (0, 0)
pub fn calculate_display_range(page: i64, per_page: i64, current_count: usize) -> (i64, i64) {
    if current_count == 0 {
        return (0, 0);
    }

    let start_item = (page - 1) * per_page + 1;
    let end_item = start_item - 1 + current_count as i64;

    (start_item, end_item)
}

/// 页码窗口：导航条中可直接点击的连续页码
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct PaginationWindow {
    /// 严格递增且连续的页码，均位于 [1, total_pages]
    pub pages: Vec<i64>,
    /// 窗口不是从第 1 页开始
    pub show_leading_ellipsis: bool,
    /// 窗口没有延伸到最后一页
    pub show_trailing_ellipsis: bool,
}

/// 规范化窗口大小
///
/// 小于 1 的值按 1 处理，偶数向下取到最近的奇数（4 → 3），
/// 保证当前页两侧的页码数量相同
pub fn normalize_window_size(window_size: i64) -> i64 {
    if window_size < 1 {
        1
    } else if window_size % 2 == 0 {
        window_size - 1
    } else {
        window_size
    }
}

/// 计算以当前页为中心的页码窗口
///
/// # 参数
/// * `current_page` - 当前页码，不做钳制，超出范围时仍返回合法窗口
/// * `total_pages` - 总页数，负数按 0 处理
/// * `window_size` - 最多显示的页码数量，见 [`normalize_window_size`]
///
/// # 返回值
/// 页码列表及前后省略号标记，该函数不会 panic
pub fn compute_window(current_page: i64, total_pages: i64, window_size: i64) -> PaginationWindow {
    let window_size = normalize_window_size(window_size);
    let total_pages = total_pages.max(0);

    if total_pages <= window_size {
        return PaginationWindow {
            pages: (1..=total_pages).collect(),
            show_leading_ellipsis: false,
            show_trailing_ellipsis: false,
        };
    }

    let half = window_size / 2;

    // 先以当前页为中心，再整体平移到 [1, total_pages] 之内
    let start = current_page
        .saturating_sub(half)
        .clamp(1, total_pages - window_size + 1);
    let end = start + window_size - 1;

    PaginationWindow {
        pages: (start..=end).collect(),
        show_leading_ellipsis: start > 1,
        show_trailing_ellipsis: end < total_pages,
    }
}

/// 导航条中的单个元素
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum PageItem {
    Page(i64),
    Current(i64),
    Ellipsis,
}

/// 分页导航条
///
/// 包含上一页/下一页目标页码以及按顺序排列的页码元素。
/// 省略号只在隐藏了至少两页时出现，只隐藏一页时直接显示该页
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct PaginationNav {
    pub prev: Option<i64>,
    pub next: Option<i64>,
    pub items: Vec<PageItem>,
}

impl PaginationNav {
    /// 根据分页信息构建导航条
    pub fn build(pagination: &Pagination, window_size: i64) -> Self {
        let total = pagination.total_pages;
        if total <= 0 {
            return Self::default();
        }

        let current = pagination.current_page.clamp(1, total);
        let window = compute_window(current, total, window_size);
        let link = |page: i64| {
            if page == current {
                PageItem::Current(page)
            } else {
                PageItem::Page(page)
            }
        };

        let (first, last) = match (window.pages.first(), window.pages.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => return Self::default(),
        };

        let mut items = Vec::with_capacity(window.pages.len() + 4);

        if window.show_leading_ellipsis {
            items.push(link(1));
            match first - 2 {
                0 => {}
                1 => items.push(link(2)),
                _ => items.push(PageItem::Ellipsis),
            }
        }

        items.extend(window.pages.iter().copied().map(link));

        if window.show_trailing_ellipsis {
            match total - last - 1 {
                0 => {}
                1 => items.push(link(total - 1)),
                _ => items.push(PageItem::Ellipsis),
            }
            items.push(link(total));
        }

        Self {
            prev: (current > 1).then(|| current - 1),
            next: (current < total).then(|| current + 1),
            items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// 分页导航条中链接的目标
///
/// htmx 请求 `block_url` 返回的片段并替换 `target`，
/// 普通点击（中键、禁用脚本）则跳转到 `page_url` 对应的完整页面
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub block_url: &'static str,
    pub page_url: &'static str,
    pub target: &'static str,
    /// 翻页时一并提交的筛选表单选择器，空字符串表示没有
    pub hx_include: &'static str,
    /// 完整页面链接上附带的筛选参数，值为空的不会出现
    pub filters: Vec<(&'static str, String)>,
}

impl PageLinks {
    pub fn new(block_url: &'static str, page_url: &'static str, target: &'static str) -> Self {
        Self {
            block_url,
            page_url,
            target,
            ..Default::default()
        }
    }

    pub fn include(mut self, selector: &'static str) -> Self {
        self.hx_include = selector;
        self
    }

    pub fn filter(mut self, key: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.filters.push((key, value));
        }
        self
    }
}
