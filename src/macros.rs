// SPDX-FileCopyrightText: 2026 Joshua Goins <josh@redstrate.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Implements [`Record`](crate::record::Record) for a `binrw` struct of `size` bytes.
///
/// Structs with reference fields must import a `&ReadContext` when reading and a `&WriteContext`
/// when writing. Pass `plain` for structs that import nothing.
macro_rules! impl_record {
    ($name:ty, $size:expr) => {
        impl $crate::record::Record for $name {
            const SIZE: usize = $size;

            fn read_record<R: std::io::Read + std::io::Seek>(
                reader: &mut R,
                context: &$crate::record::ReadContext,
            ) -> binrw::BinResult<Self> {
                <$name as binrw::BinRead>::read_options(reader, binrw::Endian::Little, (context,))
            }

            fn write_record<W: std::io::Write + std::io::Seek>(
                &self,
                writer: &mut W,
                context: &$crate::record::WriteContext,
            ) -> binrw::BinResult<()> {
                binrw::BinWrite::write_options(self, writer, binrw::Endian::Little, (context,))
            }
        }
    };
    ($name:ty, $size:expr, plain) => {
        impl $crate::record::Record for $name {
            const SIZE: usize = $size;

            fn read_record<R: std::io::Read + std::io::Seek>(
                reader: &mut R,
                _: &$crate::record::ReadContext,
            ) -> binrw::BinResult<Self> {
                <$name as binrw::BinRead>::read_options(reader, binrw::Endian::Little, ())
            }

            fn write_record<W: std::io::Write + std::io::Seek>(
                &self,
                writer: &mut W,
                _: &$crate::record::WriteContext,
            ) -> binrw::BinResult<()> {
                binrw::BinWrite::write_options(self, writer, binrw::Endian::Little, ())
            }
        }
    };
}

/// Generates one test per record checking that its encoded size matches its declared size.
#[cfg(test)]
macro_rules! record_size_tests {
    ($($name:ident),+ $(,)?) => {
        ::paste::paste! {
            $(
                #[test]
                fn [<$name:snake _size>]() {
                    assert_eq!(
                        $crate::record::encoded_size(&$name::default()),
                        <$name as $crate::record::Record>::SIZE
                    );
                }
            )+
        }
    };
}

/// Generates the little-endian primitive reads of [`ResourceReader`](crate::reader::ResourceReader).
macro_rules! reader_primitives {
    ($($ty:ident),+ $(,)?) => {
        ::paste::paste! {
            $(
                pub fn [<read_ $ty>](&mut self) -> $crate::error::Result<$ty> {
                    let position = self.cursor.position();
                    self.cursor
                        .read_le::<$ty>()
                        .map_err(|err| self.malformed(position, err))
                }

                pub fn [<read_ $ty _list>](&mut self, count: usize) -> $crate::error::Result<Vec<$ty>> {
                    self.ensure_remaining(count.saturating_mul(std::mem::size_of::<$ty>()))?;
                    (0..count).map(|_| self.[<read_ $ty>]()).collect()
                }
            )+
        }
    };
}

/// Generates the little-endian primitive writes of [`ResourceBuilder`](crate::builder::ResourceBuilder).
macro_rules! builder_primitives {
    ($($ty:ident),+ $(,)?) => {
        ::paste::paste! {
            $(
                pub fn [<write_ $ty>](&mut self, value: $ty) -> $crate::error::Result<()> {
                    self.body.write_le(&value)?;
                    Ok(())
                }

                pub fn [<write_ $ty _list>](&mut self, values: &[$ty]) -> $crate::error::Result<()> {
                    for value in values {
                        self.body.write_le(value)?;
                    }
                    Ok(())
                }
            )+
        }
    };
}
