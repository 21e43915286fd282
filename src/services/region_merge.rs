//! 文字区域合并
//!
//! 上游把同一段文字拆成多行，这里把水平中心接近、垂直方向相邻的行并成一个区域。
//! 相邻关系可以传递，用并查集求连通分量。

use crate::models::region::pixel_style;
use crate::models::{Bounds, BoundingPoly, TextRegion};

/// 合并阈值（像素）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeThresholds {
    /// 水平中心距离上限
    pub x: f64,
    /// 垂直方向容差
    pub y: f64,
}

impl Default for MergeThresholds {
    fn default() -> Self {
        Self { x: 10.0, y: 15.0 }
    }
}

/// 并查集，查找时做路径减半
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, i: usize, j: usize) {
        let (ri, rj) = (self.find(i), self.find(j));
        if ri != rj {
            self.parent[rj] = ri;
        }
    }
}

fn adjacent(a: &Bounds, b: &Bounds, t: MergeThresholds) -> bool {
    let (ax, _) = a.center();
    let (bx, _) = b.center();
    (ax - bx).abs() < t.x
        && (a.top as f64) - t.y < b.bottom as f64
        && (a.bottom as f64) + t.y > b.top as f64
}

/// 合并文字区域
///
/// 输出顺序按每组第一个成员在输入中的位置排列；
/// 单成员组原样保留（去掉原始样式），多成员组取包围盒并集、文字按行拼接。
/// 合并后的包围盒可能与原本不相邻的区域相邻，因此重复合并直到区域数不再减少，
/// 对结果再次合并不会产生变化
pub fn merge_regions(regions: &[TextRegion], thresholds: MergeThresholds) -> Vec<TextRegion> {
    let mut merged = merge_pass(regions, thresholds);
    loop {
        let next = merge_pass(&merged, thresholds);
        if next.len() == merged.len() {
            return merged;
        }
        merged = next;
    }
}

fn merge_pass(regions: &[TextRegion], thresholds: MergeThresholds) -> Vec<TextRegion> {
    let bounds: Vec<Bounds> = regions.iter().map(|r| r.bounding_poly.bounds()).collect();
    let mut set = DisjointSet::new(regions.len());
    for i in 0..regions.len() {
        for j in (i + 1)..regions.len() {
            if adjacent(&bounds[i], &bounds[j], thresholds) {
                set.union(i, j);
            }
        }
    }

    // (根, 成员下标)，按首次出现顺序
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    for i in 0..regions.len() {
        let root = set.find(i);
        match groups.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(i),
            None => groups.push((root, vec![i])),
        }
    }

    groups
        .into_iter()
        .map(|(_, members)| {
            if let [only] = members[..] {
                return regions[only].without_raw();
            }
            let envelope = members
                .iter()
                .map(|&i| bounds[i])
                .reduce(|acc, b| acc.union(&b))
                .unwrap_or(bounds[members[0]]);
            let description = members
                .iter()
                .map(|&i| regions[i].description.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            TextRegion {
                description,
                bounding_poly: BoundingPoly::from_bounds(envelope),
                rotate: 0.0,
                style: pixel_style(
                    envelope.top,
                    envelope.left,
                    envelope.right - envelope.left,
                    envelope.bottom - envelope.top,
                    0,
                ),
                raw: None,
            }
        })
        .collect()
}

/// 所有原始区域文字以空格拼接
pub fn full_text(raw: &[TextRegion]) -> String {
    raw.iter()
        .map(|r| r.description.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(text: &str, left: i64, right: i64, top: i64, bottom: i64) -> TextRegion {
        TextRegion::from_bounds(
            text,
            Bounds {
                left,
                right,
                top,
                bottom,
            },
            0.0,
        )
    }

    #[test]
    fn test_stacked_lines_merge() {
        let regions = vec![region("A", 10, 60, 0, 20), region("B", 12, 62, 18, 38)];

        let merged = merge_regions(&regions, MergeThresholds::default());

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].description, "A\nB");
        assert_eq!(
            merged[0].bounding_poly.bounds(),
            Bounds {
                left: 10,
                right: 62,
                top: 0,
                bottom: 38
            }
        );
        assert_eq!(
            merged[0].style,
            "top: 0px; left: 10px; width: 52px; height: 38px; transform: rotate(0deg);"
        );
        assert_eq!(merged[0].rotate, 0.0);
    }

    #[test]
    fn test_distant_columns_stay_apart() {
        let regions = vec![
            region("left", 0, 40, 0, 20),
            region("right", 100, 140, 0, 20),
            region("far below", 0, 40, 100, 120),
        ];

        let merged = merge_regions(&regions, MergeThresholds::default());

        assert_eq!(merged.len(), 3);
        let texts: Vec<_> = merged.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(texts, ["left", "right", "far below"]);
    }

    #[test]
    fn test_transitive_groups_keep_first_appearance_order() {
        // 0 与 2 相邻、2 与 3 相邻，1 单独一组
        let regions = vec![
            region("a", 0, 40, 0, 20),
            region("x", 200, 240, 0, 20),
            region("b", 2, 42, 25, 45),
            region("c", 4, 44, 50, 70),
        ];

        let merged = merge_regions(&regions, MergeThresholds::default());

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].description, "a\nb\nc");
        assert_eq!(merged[1].description, "x");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let regions = vec![
            region("A", 10, 60, 0, 20),
            region("B", 12, 62, 18, 38),
            region("C", 300, 360, 0, 20),
        ];

        let once = merge_regions(&regions, MergeThresholds::default());
        let twice = merge_regions(&once, MergeThresholds::default());

        assert_eq!(once, twice);
    }

    #[test]
    fn test_envelope_reaching_new_neighbour_is_merged_again() {
        // D 与 A、B 单独都不相邻，但 A+B 的包围盒中心距离 D 足够近
        let regions = vec![
            region("D", 20, 24, 20, 40),
            region("A", 0, 20, 50, 70),
            region("B", 10, 28, 70, 90),
        ];

        let once = merge_regions(&regions, MergeThresholds::default());
        let twice = merge_regions(&once, MergeThresholds::default());

        assert_eq!(once.len(), 1);
        assert_eq!(once[0].description, "D\nA\nB");
        assert_eq!(
            once[0].bounding_poly.bounds(),
            Bounds {
                left: 0,
                right: 28,
                top: 20,
                bottom: 90
            }
        );
        assert_eq!(once, twice);
    }

    #[test]
    fn test_singleton_drops_raw_geometry() {
        let mut only = region("solo", 0, 10, 0, 10);
        only.raw = Some(crate::models::RawGeometry {
            raw_style: "top: calc(0% + 0px);".to_string(),
            top_str: "calc(0% + 0px)".to_string(),
            left_str: String::new(),
            width_str: String::new(),
            height_str: String::new(),
        });

        let merged = merge_regions(&[only.clone()], MergeThresholds::default());

        assert_eq!(merged, vec![only.without_raw()]);
    }

    #[test]
    fn test_full_text_uses_raw_order() {
        let raw = vec![region("Hello", 0, 1, 0, 1), region("world ", 0, 1, 0, 1)];
        assert_eq!(full_text(&raw), "Hello world");
        assert_eq!(full_text(&[]), "");
    }
}
