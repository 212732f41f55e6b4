//! 按键计算列表差异
//!
//! `plan` 把已发布的列表变换为目标列表，固定分三个阶段: 删除、移动、插入。
//! 每个差异都以上一个差异应用之后的列表为准，
//! 观察者逐条应用时不会遇到越界的下标。
//!
//! 同一列表内的键必须唯一。

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDelta {
    Remove { index: usize },
    /// 取出 `from` 处的行，再插入到 `to`
    Move { from: usize, to: usize },
    /// 在 `index` 处插入 `target[index]`
    Insert { index: usize },
}

impl ListDelta {
    /// 移动通知使用的目标位置，按取出该行之前的列表计算
    pub fn destination(&self) -> Option<usize> {
        match *self {
            ListDelta::Move { from, to } if to > from => Some(to + 1),
            ListDelta::Move { to, .. } => Some(to),
            _ => None,
        }
    }
}

/// 计算把 `current` 变为 `target` 的差异序列
pub fn plan<T, K, F>(current: &[T], target: &[T], key: F) -> Vec<ListDelta>
where
    K: Eq + Hash + Clone,
    F: Fn(&T) -> K,
{
    let target_keys: Vec<K> = target.iter().map(&key).collect();
    let wanted: HashSet<&K> = target_keys.iter().collect();
    let mut working: Vec<K> = current.iter().map(&key).collect();
    let mut deltas = Vec::new();

    // 单次正向遍历，删除后下标不前进
    let mut i = 0;
    while i < working.len() {
        if wanted.contains(&working[i]) {
            i += 1;
        } else {
            working.remove(i);
            deltas.push(ListDelta::Remove { index: i });
        }
    }

    // 只保留未被删除的行的目标顺序
    let kept: HashSet<K> = working.iter().cloned().collect();
    let order: HashMap<K, usize> = target_keys
        .iter()
        .filter(|k| kept.contains(*k))
        .enumerate()
        .map(|(pos, k)| (k.clone(), pos))
        .collect();

    // 反复完整遍历，位置不对的行直接移到目标位置，
    // 直到某一轮没有需要移动的行
    loop {
        let mut moved = false;
        for i in 0..working.len() {
            let to = order[&working[i]];
            if to == i {
                continue;
            }
            let row = working.remove(i);
            working.insert(to, row);
            deltas.push(ListDelta::Move { from: i, to });
            moved = true;
        }
        if !moved {
            break;
        }
    }

    // 此时顺序已与目标一致，`index` 之前的行都已就位
    for (index, k) in target_keys.iter().enumerate() {
        if !kept.contains(k) {
            working.insert(index, k.clone());
            deltas.push(ListDelta::Insert { index });
        }
    }

    deltas
}

/// 应用 `plan` 针对同一 `target` 生成的单个差异
pub fn apply<T: Clone>(list: &mut Vec<T>, target: &[T], delta: &ListDelta) {
    match *delta {
        ListDelta::Remove { index } => {
            list.remove(index);
        }
        ListDelta::Move { from, to } => {
            let row = list.remove(from);
            list.insert(to, row);
        }
        ListDelta::Insert { index } => list.insert(index, target[index].clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(current: &[&str], target: &[&str]) -> (Vec<String>, Vec<ListDelta>) {
        let current: Vec<String> = current.iter().map(|s| s.to_string()).collect();
        let target: Vec<String> = target.iter().map(|s| s.to_string()).collect();
        let deltas = plan(&current, &target, |s| s.clone());

        let mut list = current;
        for delta in &deltas {
            apply(&mut list, &target, delta);
        }
        (list, deltas)
    }

    #[test]
    fn test_remove_only() {
        let (list, deltas) = run(&["a", "b", "c", "d"], &["b", "d"]);
        assert_eq!(list, vec!["b", "d"]);
        assert_eq!(
            deltas,
            vec![ListDelta::Remove { index: 0 }, ListDelta::Remove { index: 1 }]
        );
    }

    #[test]
    fn test_insert_only() {
        let (list, deltas) = run(&["b"], &["a", "b", "c"]);
        assert_eq!(list, vec!["a", "b", "c"]);
        assert_eq!(
            deltas,
            vec![ListDelta::Insert { index: 0 }, ListDelta::Insert { index: 2 }]
        );
    }

    #[test]
    fn test_move_forward_destination() {
        let (list, deltas) = run(&["a", "b", "c"], &["b", "c", "a"]);
        assert_eq!(list, vec!["b", "c", "a"]);
        assert_eq!(deltas[0], ListDelta::Move { from: 0, to: 2 });
        assert_eq!(deltas[0].destination(), Some(3));
        assert_eq!(deltas.len(), 1);
    }

    #[test]
    fn test_move_backward() {
        let (list, deltas) = run(&["a", "b", "c"], &["c", "a", "b"]);
        assert_eq!(list, vec!["c", "a", "b"]);
        assert!(deltas
            .iter()
            .all(|d| matches!(d, ListDelta::Move { .. })));
        assert_eq!(ListDelta::Move { from: 2, to: 0 }.destination(), Some(0));
        assert_eq!(ListDelta::Insert { index: 1 }.destination(), None);
    }

    #[test]
    fn test_mixed_phases_in_order() {
        let (list, deltas) = run(&["x", "c", "a", "y", "b"], &["a", "n", "b", "c"]);
        assert_eq!(list, vec!["a", "n", "b", "c"]);

        let phase = |d: &ListDelta| match d {
            ListDelta::Remove { .. } => 0,
            ListDelta::Move { .. } => 1,
            ListDelta::Insert { .. } => 2,
        };
        let phases: Vec<u8> = deltas.iter().map(phase).collect();
        let mut sorted = phases.clone();
        sorted.sort();
        assert_eq!(phases, sorted);
    }

    #[test]
    fn test_identical_lists_produce_nothing() {
        let (_, deltas) = run(&["a", "b", "c"], &["a", "b", "c"]);
        assert!(deltas.is_empty());
        let (_, deltas) = run(&[], &[]);
        assert!(deltas.is_empty());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn unique_keys() -> impl Strategy<Value = Vec<u8>> {
            proptest::collection::hash_set(0u8..24, 0..16)
                .prop_map(|set| set.into_iter().collect::<Vec<_>>())
                .prop_shuffle()
        }

        proptest! {
            /// 应用差异后得到目标列表，且下标始终有效
            #[test]
            fn prop_plan_reaches_target(current in unique_keys(), target in unique_keys()) {
                let deltas = plan(&current, &target, |k| *k);
                let mut list = current.clone();
                for delta in &deltas {
                    match *delta {
                        ListDelta::Remove { index } => prop_assert!(index < list.len()),
                        ListDelta::Move { from, to } => {
                            prop_assert!(from < list.len());
                            prop_assert!(to < list.len());
                        }
                        ListDelta::Insert { index } => prop_assert!(index <= list.len()),
                    }
                    apply(&mut list, &target, delta);
                }
                prop_assert_eq!(list, target);
            }

            /// 对结果再次计算差异为空
            #[test]
            fn prop_plan_is_idempotent(current in unique_keys(), target in unique_keys()) {
                let deltas = plan(&current, &target, |k| *k);
                let mut list = current.clone();
                for delta in &deltas {
                    apply(&mut list, &target, delta);
                }
                prop_assert!(plan(&list, &target, |k| *k).is_empty());
            }
        }
    }
}
