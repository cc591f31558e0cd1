/// Byte-wise XOR. The result is as long as the shorter input.
pub fn fixed_xor(buf1: &[u8], buf2: &[u8]) -> Vec<u8> {
    buf1.iter()
        .zip(buf2.iter())
        .map(|(x,y)| x ^ y)
        .collect()
}

#[test]
fn test_fixed_xor() {
    let case_buf1 = hex!("1c0111001f010100061a024b53535009181c");
    let case_buf2 = hex!("686974207468652062756c6c277320657965");
    let expected = hex!("746865206b696420646f6e277420706c6179");
    let result = fixed_xor(&case_buf1, &case_buf2);
    assert_eq!(result, expected);
}

#[test]
fn test_fixed_xor_truncates() {
    assert_eq!(vec![0x03, 0x01], fixed_xor(&[0x01, 0x02, 0x03], &[0x02, 0x03]));
    assert!(fixed_xor(&[], &[0xff]).is_empty());
}
