// SPDX-License-Identifier: MPL-2.0

//! Virtual filesystem (§4.3): path resolution, vnodes, the descriptor
//! table, and the ambient ramfs backing store.

pub mod device;
pub mod file_table;
pub mod path;
pub mod ramfs;
pub mod syscall;
pub mod vnode;

pub use device::DeviceKind;
pub use file_table::{Fd, FileTable, OpenFile, Whence};
pub use path::OpenFlags;
pub use ramfs::RamFs;
pub use vnode::{Ino, Stat, Vnode, VnodeType};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    fn setup() -> (Arc<RamFs>, Arc<Vnode>) {
        let fs = RamFs::new();
        let root = fs.root();
        (fs, root)
    }

    #[test]
    fn create_write_read_roundtrip() {
        let (_fs, root) = setup();
        let mut files = FileTable::new();
        let fd = syscall::open(&root, &root, &mut files, "hello.txt", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, None).unwrap();
        syscall::write(&files, fd, b"hi there").unwrap();
        syscall::close(&mut files, fd).unwrap();

        let fd = syscall::open(&root, &root, &mut files, "hello.txt", OpenFlags::O_RDONLY, None).unwrap();
        let mut buf = [0u8; 8];
        let n = syscall::read(&files, fd, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi there");
    }

    #[test]
    fn mkdir_rmdir_dot_dotdot() {
        let (_fs, root) = setup();
        syscall::mkdir(&root, &root, "sub").unwrap();
        let sub = path::resolve(&root, Some(&root), "sub").unwrap();
        let dot = sub.lookup(".").unwrap();
        assert_eq!(dot.ino, sub.ino);
        let dotdot = sub.lookup("..").unwrap();
        assert_eq!(dotdot.ino, root.ino);

        let err = root.rmdir(".").unwrap_err();
        assert_eq!(err.errno(), crate::error::Errno::EINVAL);
        let err = root.rmdir("..").unwrap_err();
        assert_eq!(err.errno(), crate::error::Errno::ENOTEMPTY);

        syscall::rmdir(&root, &root, "sub").unwrap();
        assert!(path::resolve(&root, Some(&root), "sub").is_err());
    }

    #[test]
    fn unlink_directory_is_eperm() {
        let (_fs, root) = setup();
        syscall::mkdir(&root, &root, "sub").unwrap();
        let err = syscall::unlink(&root, &root, "sub").unwrap_err();
        assert_eq!(err.errno(), crate::error::Errno::EPERM);
    }

    #[test]
    fn hardlink_survives_original_unlink() {
        let (_fs, root) = setup();
        let mut files = FileTable::new();
        let fd = syscall::open(&root, &root, &mut files, "a", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, None).unwrap();
        syscall::write(&files, fd, b"payload").unwrap();
        syscall::close(&mut files, fd).unwrap();

        syscall::link(&root, &root, "a", "b").unwrap();
        syscall::unlink(&root, &root, "a").unwrap();
        assert!(path::resolve(&root, Some(&root), "a").is_err());

        let fd = syscall::open(&root, &root, &mut files, "b", OpenFlags::O_RDONLY, None).unwrap();
        let mut buf = [0u8; 7];
        syscall::read(&files, fd, &mut buf).unwrap();
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn open_without_creat_on_missing_path_is_enoent() {
        let (_fs, root) = setup();
        let mut files = FileTable::new();
        let err = syscall::open(&root, &root, &mut files, "missing", OpenFlags::O_RDONLY, None).unwrap_err();
        assert_eq!(err.errno(), crate::error::Errno::ENOENT);
    }

    #[test]
    fn dup_shares_position() {
        let (_fs, root) = setup();
        let mut files = FileTable::new();
        let fd = syscall::open(&root, &root, &mut files, "a", OpenFlags::O_WRONLY | OpenFlags::O_CREAT, None).unwrap();
        syscall::write(&files, fd, b"0123456789").unwrap();
        syscall::close(&mut files, fd).unwrap();

        let fd1 = syscall::open(&root, &root, &mut files, "a", OpenFlags::O_RDONLY, None).unwrap();
        let fd2 = syscall::dup(&mut files, fd1).unwrap();
        let mut buf = [0u8; 4];
        syscall::read(&files, fd1, &mut buf).unwrap();
        syscall::read(&files, fd2, &mut buf).unwrap();
        assert_eq!(&buf, b"4567", "fd2 continues from where fd1 left off");
    }

    #[test]
    fn mknod_creates_a_block_device_node_through_the_public_syscall() {
        let (_fs, root) = setup();
        syscall::mknod(&root, &root, "hda", DeviceKind::Placeholder { major: 3, minor: 0 }, VnodeType::BlockDevice).unwrap();
        let node = path::resolve(&root, Some(&root), "hda").unwrap();
        assert_eq!(node.vtype, VnodeType::BlockDevice);
    }

    #[test]
    fn open_with_creat_and_devid_honors_the_requested_vnode_type() {
        let (_fs, root) = setup();
        let mut files = FileTable::new();
        let fd = syscall::open(
            &root,
            &root,
            &mut files,
            "hdb",
            OpenFlags::O_RDONLY | OpenFlags::O_CREAT,
            Some((DeviceKind::Placeholder { major: 3, minor: 1 }, VnodeType::BlockDevice)),
        )
        .unwrap();
        syscall::close(&mut files, fd).unwrap();
        let node = path::resolve(&root, Some(&root), "hdb").unwrap();
        assert_eq!(node.vtype, VnodeType::BlockDevice);
    }
}
