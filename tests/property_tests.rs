use proptest::prelude::*;
use valpack::{collection, Builder, BuilderOptions, PackValue, ValueKind, ValueView};

fn encode(value: PackValue) -> Vec<u8> {
    let mut b = Builder::new();
    b.add(value).unwrap();
    b.into_bytes().unwrap()
}

proptest! {
    /// Round trip: закодированное знаковое целое декодируется в то же
    /// значение, а вид соответствует диапазону.
    #[test]
    fn int_round_trip(v in any::<i64>()) {
        let bytes = encode(PackValue::Int(v));
        let view = ValueView::new(&bytes);
        prop_assert_eq!(view.get_int().unwrap(), v);
        let expected_kind = if (-6..=9).contains(&v) {
            ValueKind::SmallInt
        } else {
            ValueKind::Int
        };
        prop_assert_eq!(view.kind(), expected_kind);
        prop_assert_eq!(view.byte_size().unwrap(), bytes.len());
    }

    #[test]
    fn uint_round_trip(v in any::<u64>()) {
        let bytes = encode(PackValue::UInt(v));
        let view = ValueView::new(&bytes);
        prop_assert_eq!(view.get_uint().unwrap(), v);
        prop_assert_eq!(view.byte_size().unwrap(), bytes.len());
    }

    /// Double сохраняет точный битовый паттерн, включая NaN.
    #[test]
    fn double_round_trip_is_bit_exact(v in any::<f64>()) {
        let bytes = encode(PackValue::Double(v));
        let view = ValueView::new(&bytes);
        prop_assert_eq!(view.get_double().unwrap().to_bits(), v.to_bits());
    }

    #[test]
    fn string_round_trip(s in ".{0,200}") {
        let bytes = encode(PackValue::Str(s.clone()));
        let view = ValueView::new(&bytes);
        prop_assert_eq!(view.get_str().unwrap(), s.as_str());
        prop_assert_eq!(view.byte_size().unwrap(), bytes.len());
    }

    #[test]
    fn binary_round_trip(data in proptest::collection::vec(any::<u8>(), 0..400)) {
        let bytes = encode(PackValue::Binary(data.clone()));
        let view = ValueView::new(&bytes);
        prop_assert_eq!(view.get_binary().unwrap(), data.as_slice());
        prop_assert_eq!(view.byte_size().unwrap(), bytes.len());
    }

    #[test]
    fn utc_date_round_trip(ts in any::<i64>()) {
        let bytes = encode(PackValue::UtcDate(ts));
        let view = ValueView::new(&bytes);
        prop_assert_eq!(view.get_utc_date().unwrap(), ts);
    }

    /// Массив из произвольных целых читается поэлементно; размер значения
    /// самоописываем.
    #[test]
    fn array_of_ints_round_trip(values in proptest::collection::vec(any::<i64>(), 0..40)) {
        let mut b = Builder::new();
        b.open_array().unwrap();
        for &v in &values {
            b.add(PackValue::Int(v)).unwrap();
        }
        b.close().unwrap();

        let bytes = b.into_bytes().unwrap();
        let view = ValueView::new(&bytes);
        prop_assert_eq!(view.byte_size().unwrap(), bytes.len());
        prop_assert_eq!(view.length().unwrap(), values.len());
        for (i, &v) in values.iter().enumerate() {
            prop_assert_eq!(view.at(i).unwrap().get_int().unwrap(), v);
        }
    }

    /// Двоичный и линейный поиск согласованы на случайных наборах ключей
    /// из узкого алфавита: ключи часто оказываются префиксами друг друга.
    #[test]
    fn search_agreement_on_random_keys(
        raw_keys in proptest::collection::hash_set("[ab]{1,6}", 4..20)
    ) {
        let keys: Vec<String> = raw_keys.into_iter().collect();

        let mut sorted = Builder::new();
        let mut unsorted = Builder::with_options(BuilderOptions {
            sort_keys: false,
            ..Default::default()
        });
        sorted.open_object().unwrap();
        unsorted.open_object().unwrap();
        for (i, key) in keys.iter().enumerate() {
            sorted.add_keyed(key, PackValue::Int(i as i64)).unwrap();
            unsorted.add_keyed(key, PackValue::Int(i as i64)).unwrap();
        }
        sorted.close().unwrap();
        unsorted.close().unwrap();

        let sorted_view = sorted.view().unwrap();
        let unsorted_view = unsorted.view().unwrap();

        for (i, key) in keys.iter().enumerate() {
            prop_assert_eq!(sorted_view.get(key).unwrap().get_int().unwrap(), i as i64);
            prop_assert_eq!(unsorted_view.get(key).unwrap().get_int().unwrap(), i as i64);
        }

        // Заведомо отсутствующие ключи, включая префиксные формы.
        for absent in ["", "c", "aaaaaaa", "bbbbbbb", "abababa"] {
            prop_assert!(sorted_view.get(absent).unwrap().is_none());
            prop_assert!(unsorted_view.get(absent).unwrap().is_none());
        }
    }

    /// Дуальность keep/remove на случайных объектах.
    #[test]
    fn keep_remove_partition_keys(
        raw_keys in proptest::collection::hash_set("[a-z]{1,8}", 1..25),
        selector in any::<u64>()
    ) {
        let all_keys: Vec<String> = raw_keys.into_iter().collect();

        let mut b = Builder::new();
        b.open_object().unwrap();
        for (i, key) in all_keys.iter().enumerate() {
            b.add_keyed(key, PackValue::Int(i as i64)).unwrap();
        }
        b.close().unwrap();
        let view = b.view().unwrap();

        let chosen: Vec<&str> = all_keys
            .iter()
            .enumerate()
            .filter(|(i, _)| selector & (1 << (i % 64)) != 0)
            .map(|(_, k)| k.as_str())
            .collect();

        let kept = collection::keep(&view, &chosen).unwrap();
        let removed = collection::remove(&view, &chosen).unwrap();

        let mut kept_keys = collection::keys(&kept.view().unwrap()).unwrap();
        let mut removed_keys = collection::keys(&removed.view().unwrap()).unwrap();

        for key in &kept_keys {
            prop_assert!(!removed_keys.contains(key));
        }
        let mut union = Vec::new();
        union.append(&mut kept_keys);
        union.append(&mut removed_keys);
        union.sort();
        let mut expected = all_keys.clone();
        expected.sort();
        prop_assert_eq!(union, expected);
    }
}
