//! 目录显示用的波斯语名称排序
//!
//! 字符按其在参考字母表中的位置排序。
//! 不在字母表中的字符排名相同且最低，彼此相等，排在所有字母之前。
//! 一个名称是另一个的前缀时，较短的在前。

use std::cmp::Ordering;

use super::types::CatalogItem;

pub const REFERENCE_ALPHABET: &str = "اَُِبپتثجچحخدذرزژسشصضطظعغفقکگلمنوهی";

fn rank(c: char) -> Option<usize> {
    REFERENCE_ALPHABET.chars().position(|r| r == c)
}

/// 按参考字母表比较两个名称
pub fn compare_names(a: &str, b: &str) -> Ordering {
    for (ca, cb) in a.chars().zip(b.chars()) {
        let (ra, rb) = (rank(ca), rank(cb));
        if ra != rb {
            // None < Some(_)，未排名字符在前
            return ra.cmp(&rb);
        }
    }
    a.chars().count().cmp(&b.chars().count())
}

/// 按名称稳定排序
pub fn sort_items(items: &mut [CatalogItem]) {
    items.sort_by(|a, b| compare_names(&a.name, &b.name));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(guid: &str, name: &str) -> CatalogItem {
        CatalogItem {
            guid: guid.to_string(),
            name: name.to_string(),
            ..CatalogItem::default()
        }
    }

    #[test]
    fn test_alphabet_order_not_code_points() {
        // 'پ' (U+067E) 紧跟 'ب'，但码位大于 'ت' (U+062A)
        assert!('پ' > 'ت');
        assert_eq!(compare_names("پروین", "تقی"), Ordering::Less);

        // 'ک' (U+06A9) 在 'گ' 之前，'ی' 排最后
        assert_eq!(compare_names("کسایی", "گرگانی"), Ordering::Less);
        assert_eq!(compare_names("یغما", "حافظ"), Ordering::Greater);
    }

    #[test]
    fn test_prefix_sorts_first() {
        assert_eq!(compare_names("سعد", "سعدی"), Ordering::Less);
        assert_eq!(compare_names("سعدی", "سعد"), Ordering::Greater);
        assert_eq!(compare_names("حافظ", "حافظ"), Ordering::Equal);
    }

    #[test]
    fn test_unranked_characters() {
        // 拉丁字母都未排名，彼此相等，排在波斯字母之前
        assert_eq!(compare_names("abc", "xyz"), Ordering::Equal);
        assert_eq!(compare_names("zeta", "الف"), Ordering::Less);
        assert_eq!(compare_names("a", "xy"), Ordering::Less);
    }

    #[test]
    fn test_sort_items_is_stable() {
        let mut items = vec![
            named("1", "مولوی"),
            named("2", "b"),
            named("3", "حافظ"),
            named("4", "a"),
            named("5", "انوری"),
        ];
        sort_items(&mut items);

        let guids: Vec<&str> = items.iter().map(|i| i.guid.as_str()).collect();
        assert_eq!(guids, vec!["2", "4", "5", "3", "1"]);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn name_strategy() -> impl Strategy<Value = String> {
            proptest::collection::vec(
                prop_oneof![
                    proptest::sample::select(REFERENCE_ALPHABET.chars().collect::<Vec<_>>()),
                    proptest::char::range('a', 'e'),
                ],
                0..6,
            )
            .prop_map(|chars| chars.into_iter().collect())
        }

        proptest! {
            #[test]
            fn prop_antisymmetric(a in name_strategy(), b in name_strategy()) {
                prop_assert_eq!(compare_names(&a, &b), compare_names(&b, &a).reverse());
            }

            #[test]
            fn prop_transitive(a in name_strategy(), b in name_strategy(), c in name_strategy()) {
                if compare_names(&a, &b) != Ordering::Greater
                    && compare_names(&b, &c) != Ordering::Greater
                {
                    prop_assert_ne!(compare_names(&a, &c), Ordering::Greater);
                }
            }

            #[test]
            fn prop_extension_sorts_after(a in name_strategy(), suffix in name_strategy()) {
                let longer = format!("{}{}", a, suffix);
                let expected = if suffix.is_empty() { Ordering::Equal } else { Ordering::Less };
                prop_assert_eq!(compare_names(&a, &longer), expected);
            }
        }
    }
}
